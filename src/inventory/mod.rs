// Inventory domain records: items (`elementos`) and the movement ledger

pub mod types;

pub use types::{
    Item, ItemQuery, ItemStatus, ItemUpdate, Movement, MovementType, NewMovement,
    ParseValueError,
};
