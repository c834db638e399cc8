//! Declarative entity definitions.
//!
//! Every persisted entity describes its table layout with a static
//! [`EntityDefinition`]: the base table, its primary key column and the list
//! of fields. Fields flagged `shop` are additionally stored per shop in
//! `{table}_shop`; fields flagged `lang` live only in `{table}_lang`, one row
//! per language.

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Bool,
    String,
    Float,
    Price,
    Date,
    DateTime,
    Html,
}

impl FieldType {
    /// `PostgreSQL` type used when a value of this field is cast explicitly.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Int => "INTEGER",
            Self::Bool => "BOOLEAN",
            Self::String | Self::Html => "TEXT",
            Self::Float => "DOUBLE PRECISION",
            Self::Price => "NUMERIC(20, 6)",
            Self::Date => "DATE",
            Self::DateTime => "TIMESTAMPTZ",
        }
    }
}

/// Validation rule applied to non-null values of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    UnsignedId,
    Int,
    UnsignedInt,
    Bool,
    Float,
    UnsignedFloat,
    Price,
    NegativePrice,
    Percentage,
    GenericName,
    Reference,
    Ean13,
    Upc,
    DateFormat,
}

impl Rule {
    /// Name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnsignedId => "unsigned id",
            Self::Int => "integer",
            Self::UnsignedInt => "unsigned integer",
            Self::Bool => "boolean",
            Self::Float => "float",
            Self::UnsignedFloat => "unsigned float",
            Self::Price => "price",
            Self::NegativePrice => "signed price",
            Self::Percentage => "percentage",
            Self::GenericName => "generic name",
            Self::Reference => "reference",
            Self::Ean13 => "EAN-13",
            Self::Upc => "UPC",
            Self::DateFormat => "date",
        }
    }
}

/// Definition of a single entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    /// Value is also stored per shop.
    pub shop: bool,
    /// Value is stored per language.
    pub lang: bool,
    pub required: bool,
    /// Maximum length in characters for string fields.
    pub size: Option<usize>,
    pub validate: Option<Rule>,
    /// `NULL` is stored as-is instead of the type's zero value.
    pub allow_null: bool,
}

impl FieldDef {
    /// A plain, optional field without validation.
    #[must_use]
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            shop: false,
            lang: false,
            required: false,
            size: None,
            validate: None,
            allow_null: false,
        }
    }

    #[must_use]
    pub const fn shop(mut self) -> Self {
        self.shop = true;
        self
    }

    #[must_use]
    pub const fn lang(mut self) -> Self {
        self.lang = true;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub const fn validate(mut self, rule: Rule) -> Self {
        self.validate = Some(rule);
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.allow_null = true;
        self
    }
}

/// Static description of an entity's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDefinition {
    /// Base table name.
    pub table: &'static str,
    /// Primary key column, shared by the shop and lang tables.
    pub primary: &'static str,
    pub fields: &'static [FieldDef],
    /// Base table has `date_add`/`date_upd` columns maintained by the mapper.
    pub timestamps: bool,
}

impl EntityDefinition {
    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether any field is stored per shop.
    #[must_use]
    pub fn is_multishop(&self) -> bool {
        self.fields.iter().any(|f| f.shop)
    }

    /// Whether any field is stored per language.
    #[must_use]
    pub fn is_multilang(&self) -> bool {
        self.fields.iter().any(|f| f.lang)
    }

    /// Fields stored in the base table (everything except lang fields).
    pub fn base_fields(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| !f.lang)
    }

    /// Fields stored in `{table}_shop`.
    pub fn shop_fields(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| f.shop && !f.lang)
    }

    /// Fields stored in `{table}_lang`.
    pub fn lang_fields(&self) -> impl Iterator<Item = &'static FieldDef> {
        self.fields.iter().filter(|f| f.lang)
    }

    /// Name of the per-shop table.
    #[must_use]
    pub fn shop_table(&self) -> String {
        format!("{}_shop", self.table)
    }

    /// Name of the per-language table.
    #[must_use]
    pub fn lang_table(&self) -> String {
        format!("{}_lang", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldDef] = &[
        FieldDef::new("reference", FieldType::String).size(32),
        FieldDef::new("price", FieldType::Price).shop(),
        FieldDef::new("name", FieldType::String).lang().required(),
    ];

    const DEF: EntityDefinition = EntityDefinition {
        table: "thing",
        primary: "id_thing",
        fields: FIELDS,
        timestamps: false,
    };

    #[test]
    fn test_field_partitions() {
        let base: Vec<&str> = DEF.base_fields().map(|f| f.name).collect();
        let shop: Vec<&str> = DEF.shop_fields().map(|f| f.name).collect();
        let lang: Vec<&str> = DEF.lang_fields().map(|f| f.name).collect();

        assert_eq!(base, vec!["reference", "price"]);
        assert_eq!(shop, vec!["price"]);
        assert_eq!(lang, vec!["name"]);
        assert!(DEF.is_multishop());
        assert!(DEF.is_multilang());
    }

    #[test]
    fn test_overlay_table_names() {
        assert_eq!(DEF.shop_table(), "thing_shop");
        assert_eq!(DEF.lang_table(), "thing_lang");
    }

    #[test]
    fn test_builder_flags() {
        let field = FieldDef::new("ean13", FieldType::String)
            .size(13)
            .validate(Rule::Ean13);
        assert_eq!(field.size, Some(13));
        assert_eq!(field.validate, Some(Rule::Ean13));
        assert!(!field.required);
        assert!(!field.allow_null);
        assert!(FieldDef::new("default_on", FieldType::Bool).nullable().allow_null);
    }
}
