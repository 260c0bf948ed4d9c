mod item;
mod run;

pub use item::{Item, NewItem};
pub use run::{Reconciliation, Run};
