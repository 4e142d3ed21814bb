pub mod models;
pub mod order;
pub mod run;
pub mod setup;
pub mod workspace;

pub use models::*;
pub use order::*;
pub use run::*;
pub use setup::*;
pub use workspace::*;
