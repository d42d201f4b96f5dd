pub mod inspect;
pub mod plan;
pub mod run;

pub use inspect::inspect;
pub use plan::plan;
pub use run::run;
