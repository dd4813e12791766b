pub mod blur;
pub mod detect;
pub mod mux;
pub mod probe;
pub mod stage;
