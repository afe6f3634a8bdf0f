//! `exportmart-catalog`: product categories and the lookup RFQs resolve against.

pub mod category;
pub mod lookup;

pub use category::{Category, CategoryId, CategoryRef};
pub use lookup::{CategoryLookup, InMemoryCategoryCatalog};
