pub mod invalidate;
pub mod run;
pub mod status;
pub mod verify;
