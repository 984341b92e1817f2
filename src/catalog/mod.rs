// Item catalog: active-item listing, detail/history reads and lifecycle toggles

pub mod controller;

pub use controller::{CatalogController, CatalogView, ListTicket};
