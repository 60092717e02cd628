//! Product, unit-price and unit field names and table identifiers.
//!
//! Field names are the persisted column names and the document keys at the
//! same time.

pub const PRODUCTS_TABLE: &str = "products";
pub const PRODUCT_UNIT_PRICES_TABLE: &str = "productUnitPrices";
pub const UNITS_TABLE: &str = "units";

/// Columns of `products`.
pub mod product {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const SKU: &str = "sku";
    pub const REMARKS: &str = "remarks";
    pub const MANUFACTURER_PRICE: &str = "manufacturerPrice";
    pub const MANUFACTURER_PRICE_UNIT_ID: &str = "manufacturerPriceUnitId";
    /// Child collection key; not a column.
    pub const PRICES: &str = "prices";
}

/// Columns of `productUnitPrices`.
pub mod unit_price {
    pub const ID: &str = "id";
    pub const PRODUCT_ID: &str = "productId";
    pub const UNIT_ID: &str = "unitId";
    pub const PRICE: &str = "price";
}

/// Columns of `units`.
pub mod unit {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const FULL_NAME: &str = "fullName";
    pub const REMARKS: &str = "remarks";
}
