//! Checks on the data and fixture files shipped with the installer.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thirtybees_shop::config::InstallConfig;
use thirtybees_shop::services::guest_tracking::{BROWSERS, OPERATING_SYSTEMS};
use thirtybees_shop::services::installer::loader::{DataFile, parse_reference, sort_by_dependencies};

fn read_dir(dir: &Path) -> Vec<DataFile> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yml"))
        .collect();
    paths.sort();
    paths.iter().map(|path| DataFile::read(path).unwrap()).collect()
}

fn data_files() -> Vec<DataFile> {
    read_dir(&InstallConfig::from_env().data_dir)
}

fn fixture_files() -> Vec<DataFile> {
    read_dir(&InstallConfig::from_env().fixtures_dir)
}

fn position(files: &[DataFile], entity: &str) -> usize {
    files.iter().position(|f| f.entity == entity).unwrap()
}

/// Entity to the symbolic ids its rows declare.
fn declared_ids(files: &[DataFile]) -> HashMap<String, HashSet<String>> {
    let mut ids: HashMap<String, HashSet<String>> = HashMap::new();
    for file in files {
        let entry = ids.entry(file.entity.clone()).or_default();
        entry.extend(file.rows.iter().filter_map(|row| row.id.clone()));
    }
    ids
}

fn unresolved(files: &[DataFile], known: &HashMap<String, HashSet<String>>) -> Vec<String> {
    let mut missing = Vec::new();
    for file in files {
        for row in &file.rows {
            for value in row.fields.values() {
                let Some((entity, id)) = value.as_str().and_then(parse_reference) else {
                    continue;
                };
                if !known.get(entity).is_some_and(|ids| ids.contains(id)) {
                    missing.push(format!("{}: @{entity}:{id}", file.entity));
                }
            }
        }
    }
    missing
}

#[test]
fn test_data_files_sort_parents_first() {
    let sorted = sort_by_dependencies(data_files()).unwrap();

    assert!(position(&sorted, "group") < position(&sorted, "category_group"));
    assert!(position(&sorted, "category") < position(&sorted, "category_group"));
    assert!(position(&sorted, "attribute_group") < position(&sorted, "attribute"));
}

#[test]
fn test_data_references_resolve_within_data() {
    let files = data_files();
    let missing = unresolved(&files, &declared_ids(&files));
    assert!(missing.is_empty(), "unresolved references: {missing:?}");
}

#[test]
fn test_fixture_references_resolve_against_data_and_fixtures() {
    let mut files = data_files();
    files.extend(fixture_files());
    let known = declared_ids(&files);

    let missing = unresolved(&fixture_files(), &known);
    assert!(missing.is_empty(), "unresolved references: {missing:?}");
}

#[test]
fn test_fixtures_sort_without_cycles() {
    let sorted = sort_by_dependencies(fixture_files()).unwrap();
    assert!(position(&sorted, "product") < position(&sorted, "product_attribute"));
    assert!(
        position(&sorted, "product_attribute") < position(&sorted, "product_attribute_combination")
    );
    assert!(position(&sorted, "customer") < position(&sorted, "customer_group"));
}

#[test]
fn test_association_files_have_no_ids() {
    for file in data_files().into_iter().chain(fixture_files()) {
        if file.association {
            assert!(
                file.rows.iter().all(|row| row.id.is_none()),
                "{} rows carry ids",
                file.entity
            );
        }
    }
}

fn names(entity: &str) -> HashSet<String> {
    let file = data_files().into_iter().find(|f| f.entity == entity).unwrap();
    file.rows
        .iter()
        .map(|row| row.fields["name"].as_str().unwrap().to_owned())
        .collect()
}

#[test]
fn test_operating_systems_cover_detection_table() {
    let stored = names("operating_system");
    for (name, _) in OPERATING_SYSTEMS {
        assert!(stored.contains(*name), "{name} missing from operating_system.yml");
    }
}

#[test]
fn test_browsers_cover_detection_table() {
    let stored = names("web_browser");
    for (name, _) in BROWSERS {
        assert!(stored.contains(*name), "{name} missing from web_browser.yml");
    }
}

#[test]
fn test_default_groups_are_first_three_rows() {
    let groups = data_files().into_iter().find(|f| f.entity == "group").unwrap();
    let ids: Vec<_> = groups.rows.iter().filter_map(|row| row.id.as_deref()).collect();
    assert_eq!(ids[..3], ["visitor", "guest", "customer"]);
}
