//! Anonymous visitor record.

use serde::Serialize;

use thirtybees_core::{
    CustomerId, EntityDefinition, EntityValues, FieldDef, FieldType, GuestId, ModelError,
    ObjectModel, OperatingSystemId, Rule, WebBrowserId,
};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("id_operating_system", FieldType::Int)
        .nullable()
        .validate(Rule::UnsignedId),
    FieldDef::new("id_web_browser", FieldType::Int)
        .nullable()
        .validate(Rule::UnsignedId),
    FieldDef::new("id_customer", FieldType::Int)
        .nullable()
        .validate(Rule::UnsignedId),
    FieldDef::new("javascript", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("screen_resolution_x", FieldType::Int).validate(Rule::Int),
    FieldDef::new("screen_resolution_y", FieldType::Int).validate(Rule::Int),
    FieldDef::new("screen_color", FieldType::Int).validate(Rule::Int),
    FieldDef::new("sun_java", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("adobe_flash", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("adobe_director", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("apple_quicktime", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("real_player", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("windows_media", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("accept_language", FieldType::String)
        .size(8)
        .validate(Rule::GenericName),
    FieldDef::new("mobile_theme", FieldType::Bool).validate(Rule::Bool),
];

/// Browser plug-ins reported by the storefront's detection script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Plugins {
    pub sun_java: bool,
    pub adobe_flash: bool,
    pub adobe_director: bool,
    pub apple_quicktime: bool,
    pub real_player: bool,
    pub windows_media: bool,
}

/// A visitor, identified or not, stored in `guest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Guest {
    id: Option<GuestId>,
    pub operating_system_id: Option<OperatingSystemId>,
    pub web_browser_id: Option<WebBrowserId>,
    pub customer_id: Option<CustomerId>,
    pub javascript: bool,
    pub screen_resolution_x: i32,
    pub screen_resolution_y: i32,
    pub screen_color: i32,
    pub plugins: Plugins,
    /// Preferred language tag, e.g. `en` or `fr-ca`.
    pub accept_language: String,
    pub mobile_theme: bool,
}

impl Guest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the values of `self` for an already stored guest.
    ///
    /// Used when two guests are merged: the surviving row takes the most
    /// recent values.
    #[must_use]
    pub fn rebind(mut self, id: GuestId) -> Self {
        self.id = Some(id);
        self
    }
}

fn valid_id<T: From<i32>>(value: Option<i32>) -> Option<T> {
    value.filter(|v| *v > 0).map(T::from)
}

impl ObjectModel for Guest {
    type Id = GuestId;

    const DEFINITION: EntityDefinition = EntityDefinition {
        table: "guest",
        primary: "id_guest",
        fields: FIELDS,
        timestamps: false,
    };

    fn id(&self) -> Option<GuestId> {
        self.id
    }

    fn assign_id(&mut self, id: GuestId) {
        self.id = Some(id);
    }

    fn to_values(&self) -> EntityValues {
        EntityValues::new()
            .with(
                "id_operating_system",
                self.operating_system_id.map(|id| id.as_i32()),
            )
            .with("id_web_browser", self.web_browser_id.map(|id| id.as_i32()))
            .with("id_customer", self.customer_id.map(|id| id.as_i32()))
            .with("javascript", self.javascript)
            .with("screen_resolution_x", self.screen_resolution_x)
            .with("screen_resolution_y", self.screen_resolution_y)
            .with("screen_color", self.screen_color)
            .with("sun_java", self.plugins.sun_java)
            .with("adobe_flash", self.plugins.adobe_flash)
            .with("adobe_director", self.plugins.adobe_director)
            .with("apple_quicktime", self.plugins.apple_quicktime)
            .with("real_player", self.plugins.real_player)
            .with("windows_media", self.plugins.windows_media)
            .with("accept_language", self.accept_language.as_str())
            .with("mobile_theme", self.mobile_theme)
    }

    fn from_values(id: GuestId, values: &EntityValues) -> Result<Self, ModelError> {
        let flag = |field: &'static str| values.bool(field).map(Option::unwrap_or_default);
        let int = |field: &'static str| values.int(field).map(Option::unwrap_or_default);

        Ok(Self {
            id: Some(id),
            operating_system_id: valid_id(values.int("id_operating_system")?),
            web_browser_id: valid_id(values.int("id_web_browser")?),
            customer_id: valid_id(values.int("id_customer")?),
            javascript: flag("javascript")?,
            screen_resolution_x: int("screen_resolution_x")?,
            screen_resolution_y: int("screen_resolution_y")?,
            screen_color: int("screen_color")?,
            plugins: Plugins {
                sun_java: flag("sun_java")?,
                adobe_flash: flag("adobe_flash")?,
                adobe_director: flag("adobe_director")?,
                apple_quicktime: flag("apple_quicktime")?,
                real_player: flag("real_player")?,
                windows_media: flag("windows_media")?,
            },
            accept_language: values.text("accept_language")?.unwrap_or_default(),
            mobile_theme: flag("mobile_theme")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use thirtybees_core::LangId;

    #[test]
    fn test_anonymous_guest_stores_null_references() {
        let values = Guest::new().to_values();
        assert!(values.get("id_customer").is_null());
        assert!(values.get("id_operating_system").is_null());
        assert!(Guest::new().validate(LangId::new(1)).is_ok());
    }

    #[test]
    fn test_zero_reference_reads_as_none() {
        let values = Guest::new().to_values().with("id_customer", 0);
        let guest = Guest::from_values(GuestId::new(4), &values).unwrap();
        assert_eq!(guest.customer_id, None);
        assert_eq!(guest.id(), Some(GuestId::new(4)));
    }

    #[test]
    fn test_values_round_trip() {
        let mut guest = Guest::new();
        guest.customer_id = Some(CustomerId::new(9));
        guest.web_browser_id = Some(WebBrowserId::new(2));
        guest.accept_language = "fr-ca".to_owned();
        guest.plugins.adobe_flash = true;
        guest.screen_resolution_x = 1920;

        let restored = Guest::from_values(GuestId::new(1), &guest.to_values()).unwrap();
        assert_eq!(restored, guest.rebind(GuestId::new(1)));
    }

    #[test]
    fn test_accept_language_is_limited_to_eight_chars() {
        let mut guest = Guest::new();
        guest.accept_language = "de-de-extra".to_owned();
        assert!(guest.validate(LangId::new(1)).is_err());
    }
}
