mod account;
mod event;
mod integrity;
mod ledger;
mod money;

pub use account::*;
pub use event::*;
pub use integrity::*;
pub use ledger::*;
pub use money::*;
