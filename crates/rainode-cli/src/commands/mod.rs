pub mod call;
pub mod run;
pub mod wrapper;
