//! Runs against a real database.
//!
//! Needs a `PostgreSQL` database in `TEST_DATABASE_URL`. Each test drops and
//! recreates its own `tb_test_*` schema, so never point this at a shop.
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://localhost/tb_test \
//!     cargo test -p thirtybees-integration-tests --test database -- --ignored
//! ```

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::PgPool;

use thirtybees_core::{
    AttributeId, CombinationId, CustomerId, GuestId, ImageId, LangId, LangMap, ObjectModel,
    PriceDisplayMethod, ProductId, ShopContext, ShopId,
};
use thirtybees_integration_tests::{fresh_database, test_database_url};
use thirtybees_shop::config::InstallConfig;
use thirtybees_shop::db::{ObjectModelMapper, RepositoryError};
use thirtybees_shop::db::combinations::CombinationRepository;
use thirtybees_shop::db::guests::GuestRepository;
use thirtybees_shop::db::configuration::{ConfigurationRepository, keys};
use thirtybees_shop::models::combination::Combination;
use thirtybees_shop::models::group::{CategoryReductionInput, GroupInput};
use thirtybees_shop::services::installer::{InstallPlan, Installer, ShopSettings};
use thirtybees_shop::services::{GroupError, GroupService, GuestTracker, ReferenceCache, VisitorRequest};

const FIREFOX_LINUX: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

async fn install(pool: &PgPool, url: &str) -> Installer {
    let dir = tempfile::tempdir().unwrap();
    let config = InstallConfig::from_env();
    let mut installer = Installer::new(pool.clone(), &config.data_dir, &config.fixtures_dir);

    let plan = InstallPlan {
        settings_path: dir.path().join(".env"),
        database_url: SecretString::from(url),
        clear_database: true,
        languages: vec!["en".to_owned(), "fr".to_owned()],
        shop: ShopSettings {
            shop_name: "Test Shop".to_owned(),
            shop_email: "shop@example.com".to_owned(),
            ..ShopSettings::default()
        },
        entities: None,
        fixtures: None,
        skip_fixtures: false,
    };
    installer.run(&plan).await.unwrap();
    assert!(dir.path().join(".env").exists());
    installer
}

async fn check_configuration(pool: &PgPool) {
    let config = ConfigurationRepository::new(pool);
    let shop = ShopId::new(1);

    assert_eq!(
        config.get(keys::SHOP_NAME, shop).await.unwrap().as_deref(),
        Some("Test Shop")
    );
    assert_eq!(config.get_int(keys::LANG_DEFAULT, shop).await.unwrap(), Some(1));
    for key in [keys::UNIDENTIFIED_GROUP, keys::GUEST_GROUP, keys::CUSTOMER_GROUP] {
        assert!(config.get_int(key, shop).await.unwrap().is_some(), "{key} not set");
    }
}

async fn check_groups(pool: &PgPool) {
    let service = GroupService::new(pool.clone(), ShopContext::single(ShopId::new(1)));
    let en = LangId::new(1);

    let groups = service.list(en).await.unwrap();
    assert_eq!(groups.len(), 3);

    let defaults = service.default_groups().await.unwrap();
    let customer_group = groups.iter().find(|g| g.name == "Customer").unwrap();
    assert!(matches!(
        service.delete(customer_group.id).await,
        Err(GroupError::DefaultGroup)
    ));
    assert!(defaults.contains(customer_group.id));

    let input = GroupInput {
        name: LangMap::single(en, "Wholesale".to_owned()),
        reduction: Decimal::new(125, 1),
        price_display_method: PriceDisplayMethod::default(),
        show_prices: true,
        category_reductions: vec![
            CategoryReductionInput {
                category_id: 2,
                reduction: Decimal::new(5, 0),
            },
            CategoryReductionInput {
                category_id: 9999,
                reduction: Decimal::new(5, 0),
            },
        ],
    };
    let outcome = service.save(None, input, Utc::now()).await.unwrap();
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].category_id, 9999);

    let view = service.view(outcome.id, en).await.unwrap();
    assert_eq!(view.category_reductions.len(), 1);

    assert!(!service.toggle_show_prices(outcome.id).await.unwrap());
    service.delete(outcome.id).await.unwrap();
    assert!(matches!(
        service.view(outcome.id, en).await,
        Err(GroupError::NotFound)
    ));
}

async fn check_combinations(pool: &PgPool, product: ProductId) {
    let shops = ShopContext::single(ShopId::new(1));
    let repo = CombinationRepository::new(pool, &shops);

    let found = repo.id_by_reference(product, "demo_1").await.unwrap();
    assert!(found.is_some());

    let mut combination = Combination::new(product);
    combination.reference = "demo_1_xl_red".to_owned();
    combination.price = Decimal::new(300, 2);
    combination.default_on = Some(true);
    let id = repo.add(&mut combination, Utc::now()).await.unwrap();

    let stored = repo.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.reference, "demo_1_xl_red");
    assert_eq!(stored.default_on, Some(true));
    assert_eq!(repo.price(id, ShopId::new(1)).await.unwrap(), Decimal::new(300, 2));

    // Only one default per product.
    let previous: CombinationId = found.unwrap();
    let previous = repo.get_by_id(previous).await.unwrap().unwrap();
    assert_eq!(previous.default_on, None);

    assert!(repo.delete(&stored).await.unwrap());
    assert!(repo.get_by_id(id).await.unwrap().is_none());
}

async fn check_guests(pool: &PgPool, customer: CustomerId) {
    let shops = ShopContext::single(ShopId::new(1));
    let cache = ReferenceCache::new();
    let tracker = GuestTracker::new(pool, &shops, &cache);
    let request = VisitorRequest {
        user_agent: FIREFOX_LINUX.to_owned(),
        accept_language: "fr-ca, en;q=0.5".to_owned(),
    };

    let first = tracker
        .track(&request, Some(customer), Utc::now())
        .await
        .unwrap()
        .unwrap();
    let second = tracker
        .track(&request, Some(customer), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(tracker.from_customer(Some(customer)).await.unwrap(), Some(first));

    let anonymous = tracker.track(&request, None, Utc::now()).await.unwrap();
    assert!(anonymous.is_some_and(|id| id != first));
}

/// Install into a fresh schema, `None` without `TEST_DATABASE_URL`.
async fn setup(schema: &str) -> Option<(PgPool, Installer)> {
    let url = test_database_url()?;
    let pool = fresh_database(&url, schema).await.unwrap();
    let installer = install(&pool, &url).await;
    Some((pool, installer))
}

fn product(installer: &Installer, symbol: &str) -> ProductId {
    ProductId::new(installer.ids().unwrap().get("product", symbol).unwrap())
}

fn group_input(name: LangMap<String>) -> GroupInput {
    GroupInput {
        name,
        reduction: Decimal::ZERO,
        price_display_method: PriceDisplayMethod::default(),
        show_prices: true,
        category_reductions: Vec::new(),
    }
}

async fn default_flags(pool: &PgPool, product: ProductId) -> Vec<(CombinationId, Option<bool>)> {
    sqlx::query_as(
        r"
        SELECT id_product_attribute, default_on FROM product_attribute
        WHERE id_product = $1
        ORDER BY id_product_attribute
        ",
    )
    .bind(product)
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn cached_default(pool: &PgPool, product: ProductId) -> i32 {
    sqlx::query_scalar("SELECT cache_default_attribute FROM product WHERE id_product = $1")
        .bind(product)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn connection_count(pool: &PgPool, guest: GuestId) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM connections WHERE id_guest = $1")
        .bind(guest)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn add_connections(pool: &PgPool, guest: GuestId, count: usize) {
    for _ in 0..count {
        sqlx::query("INSERT INTO connections (id_guest, http_referer) VALUES ($1, 'https://example.com/')")
            .bind(guest)
            .execute(pool)
            .await
            .unwrap();
    }
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_install_then_administer() {
    let Some((pool, installer)) = setup("tb_test_install").await else {
        return;
    };
    let product = product(&installer, "tshirt");
    let customer = CustomerId::new(installer.ids().unwrap().get("customer", "john").unwrap());

    check_configuration(&pool).await;
    check_groups(&pool).await;
    check_combinations(&pool, product).await;
    check_guests(&pool, customer).await;
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_required_name_follows_default_language() {
    let Some((pool, _installer)) = setup("tb_test_default_lang").await else {
        return;
    };
    ConfigurationRepository::new(&pool)
        .update_global_value(keys::LANG_DEFAULT, "2")
        .await
        .unwrap();
    let service = GroupService::new(pool.clone(), ShopContext::single(ShopId::new(1)));

    let french_only = group_input(LangMap::single(LangId::new(2), "Grossiste".to_owned()));
    let saved = service.save(None, french_only, Utc::now()).await.unwrap();
    let view = service.view(saved.id, LangId::new(2)).await.unwrap();
    assert_eq!(view.group.name.get(LangId::new(2)).map(String::as_str), Some("Grossiste"));

    let english_only = group_input(LangMap::single(LangId::new(1), "Wholesale".to_owned()));
    let before = service.list(LangId::new(1)).await.unwrap().len();
    assert!(matches!(
        service.save(None, english_only, Utc::now()).await,
        Err(GroupError::Repository(RepositoryError::Validation(_)))
    ));
    assert_eq!(service.list(LangId::new(1)).await.unwrap().len(), before);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_invalid_default_combination_keeps_current_default() {
    let Some((pool, installer)) = setup("tb_test_invalid_default").await else {
        return;
    };
    let product = product(&installer, "tshirt");
    let shops = ShopContext::single(ShopId::new(1));
    let repo = CombinationRepository::new(&pool, &shops);

    let flags = default_flags(&pool, product).await;
    let cached = cached_default(&pool, product).await;
    assert_eq!(flags.iter().filter(|(_, on)| *on == Some(true)).count(), 1);

    let mut combination = Combination::new(product);
    combination.reference = "x".repeat(40);
    combination.default_on = Some(true);
    assert!(matches!(
        repo.add(&mut combination, Utc::now()).await,
        Err(RepositoryError::Validation(_))
    ));
    assert!(combination.id().is_none());

    let (other, _) = flags[1];
    let mut stored = repo.get_by_id(other).await.unwrap().unwrap();
    stored.reference = "y".repeat(40);
    stored.default_on = Some(true);
    assert!(matches!(
        repo.update(&mut stored, Utc::now()).await,
        Err(RepositoryError::Validation(_))
    ));

    assert_eq!(default_flags(&pool, product).await, flags);
    assert_eq!(cached_default(&pool, product).await, cached);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_deleting_default_combination_promotes_lowest_id() {
    let Some((pool, installer)) = setup("tb_test_default_delete").await else {
        return;
    };
    let shops = ShopContext::single(ShopId::new(1));
    let repo = CombinationRepository::new(&pool, &shops);

    let tshirt = product(&installer, "tshirt");
    let default = repo.id_by_reference(tshirt, "demo_1_s_white").await.unwrap().unwrap();
    let default = repo.get_by_id(default).await.unwrap().unwrap();
    assert_eq!(default.default_on, Some(true));

    assert!(repo.delete(&default).await.unwrap());

    let flags = default_flags(&pool, tshirt).await;
    assert_eq!(flags.len(), 2);
    let lowest = flags[0].0;
    assert_eq!(flags[0].1, Some(true));
    assert_eq!(flags[1].1, None);
    assert_eq!(cached_default(&pool, tshirt).await, lowest.as_i32());
    let promoted = repo.get_by_id(lowest).await.unwrap().unwrap();
    assert_eq!(promoted.default_on, Some(true));

    let sweater = product(&installer, "sweater");
    let only = repo.id_by_reference(sweater, "demo_2_m_red").await.unwrap().unwrap();
    let only = repo.get_by_id(only).await.unwrap().unwrap();
    assert!(repo.delete(&only).await.unwrap());
    assert!(default_flags(&pool, sweater).await.is_empty());
    assert_eq!(cached_default(&pool, sweater).await, 0);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_attribute_and_image_links_are_deduplicated() {
    let Some((pool, installer)) = setup("tb_test_links").await else {
        return;
    };
    let shops = ShopContext::single(ShopId::new(1));
    let repo = CombinationRepository::new(&pool, &shops);
    let tshirt = product(&installer, "tshirt");
    let ids = installer.ids().unwrap();
    let attribute = |symbol: &str| AttributeId::new(ids.get("attribute", symbol).unwrap());

    let id = repo.id_by_reference(tshirt, "demo_1_m_white").await.unwrap().unwrap();
    let size_l = attribute("size_l");
    let color_red = attribute("color_red");
    repo.set_attributes(id, &[size_l, AttributeId::new(0), color_red, size_l])
        .await
        .unwrap();

    let attributes = repo.attributes(id).await.unwrap();
    assert_eq!(attributes.len(), 2);
    let mut linked: Vec<AttributeId> = attributes.values().copied().collect();
    linked.sort();
    let mut expected = vec![size_l, color_red];
    expected.sort();
    assert_eq!(linked, expected);

    let mut images = Vec::new();
    for position in 0..2 {
        let image: ImageId =
            sqlx::query_scalar("INSERT INTO image (id_product, position) VALUES ($1, $2) RETURNING id_image")
                .bind(tshirt)
                .bind(position)
                .fetch_one(&pool)
                .await
                .unwrap();
        images.push(image);
    }
    repo.set_images(id, &[images[1], images[0], ImageId::new(0), images[1]])
        .await
        .unwrap();
    assert_eq!(repo.images(id).await.unwrap(), images);

    repo.set_images(id, &[]).await.unwrap();
    assert!(repo.images(id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_delete_for_one_shop_keeps_other_shops() {
    let Some((pool, installer)) = setup("tb_test_multishop").await else {
        return;
    };
    let second: ShopId = sqlx::query_scalar(
        r"
        INSERT INTO shop (id_shop_group, name)
        SELECT id_shop_group, 'Second Shop' FROM shop WHERE id_shop = 1
        RETURNING id_shop
        ",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let first = ShopId::new(1);
    let tshirt = product(&installer, "tshirt");

    let both = ShopContext::group(first, [first, second]);
    let mut combination = Combination::new(tshirt);
    combination.reference = "demo_1_xl_white".to_owned();
    let id = CombinationRepository::new(&pool, &both)
        .add(&mut combination, Utc::now())
        .await
        .unwrap();
    let ids = installer.ids().unwrap();
    let size_l = AttributeId::new(ids.get("attribute", "size_l").unwrap());

    let only_first = ShopContext::single(first);
    let first_repo = CombinationRepository::new(&pool, &only_first);
    first_repo.set_attributes(id, &[size_l]).await.unwrap();

    let mapper = ObjectModelMapper::new(&pool, &only_first);
    assert!(mapper.has_multishop_entries::<Combination>(id).await.unwrap());

    let only_second = ShopContext::single(second);
    let second_repo = CombinationRepository::new(&pool, &only_second);
    let stored = second_repo.get_by_id(id).await.unwrap().unwrap();
    assert!(!second_repo.delete(&stored).await.unwrap());

    assert!(!mapper.has_multishop_entries::<Combination>(id).await.unwrap());
    assert!(first_repo.get_by_id(id).await.unwrap().is_some());
    assert_eq!(first_repo.attributes(id).await.unwrap().len(), 1);

    let stored = first_repo.get_by_id(id).await.unwrap().unwrap();
    assert!(first_repo.delete(&stored).await.unwrap());
    assert!(first_repo.get_by_id(id).await.unwrap().is_none());
    assert!(first_repo.attributes(id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_guest_merge_moves_connections() {
    let Some((pool, installer)) = setup("tb_test_guest_merge").await else {
        return;
    };
    let customer = CustomerId::new(installer.ids().unwrap().get("customer", "john").unwrap());
    let shops = ShopContext::single(ShopId::new(1));
    let cache = ReferenceCache::new();
    let tracker = GuestTracker::new(&pool, &shops, &cache);
    let guests = GuestRepository::new(&pool, &shops);
    let request = VisitorRequest {
        user_agent: FIREFOX_LINUX.to_owned(),
        accept_language: "de, en;q=0.5".to_owned(),
    };

    let source = tracker.track(&request, None, Utc::now()).await.unwrap().unwrap();
    let target = tracker.track(&request, None, Utc::now()).await.unwrap().unwrap();
    add_connections(&pool, source, 3).await;
    add_connections(&pool, target, 1).await;

    let guest = guests.get_by_id(source).await.unwrap().unwrap();
    let merged = tracker
        .merge_with_customer(guest, target, customer, Utc::now())
        .await
        .unwrap();
    assert_eq!(merged.id(), Some(target));

    assert!(guests.get_by_id(source).await.unwrap().is_none());
    assert_eq!(connection_count(&pool, source).await, 0);
    assert_eq!(connection_count(&pool, target).await, 4);

    let stored = guests.get_by_id(target).await.unwrap().unwrap();
    assert_eq!(stored.customer_id, Some(customer));
    assert_eq!(stored.accept_language, "de");
    assert_eq!(tracker.from_customer(Some(customer)).await.unwrap(), Some(target));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_failed_guest_merge_changes_nothing() {
    let Some((pool, installer)) = setup("tb_test_guest_merge_failure").await else {
        return;
    };
    let customer = CustomerId::new(installer.ids().unwrap().get("customer", "john").unwrap());
    let shops = ShopContext::single(ShopId::new(1));
    let cache = ReferenceCache::new();
    let tracker = GuestTracker::new(&pool, &shops, &cache);
    let guests = GuestRepository::new(&pool, &shops);
    let request = VisitorRequest {
        user_agent: FIREFOX_LINUX.to_owned(),
        accept_language: "en".to_owned(),
    };

    let source = tracker.track(&request, None, Utc::now()).await.unwrap().unwrap();
    add_connections(&pool, source, 2).await;

    let guest = guests.get_by_id(source).await.unwrap().unwrap();
    assert!(matches!(
        tracker
            .merge_with_customer(guest, GuestId::new(999_999), customer, Utc::now())
            .await,
        Err(RepositoryError::NotFound)
    ));

    let guest = guests.get_by_id(source).await.unwrap().unwrap();
    assert!(matches!(
        tracker
            .merge_with_customer(guest, source, customer, Utc::now())
            .await,
        Err(RepositoryError::Conflict(_))
    ));

    let stored = guests.get_by_id(source).await.unwrap().unwrap();
    assert_eq!(stored.customer_id, None);
    assert_eq!(connection_count(&pool, source).await, 2);
}
