pub mod account;
pub mod audit;
pub mod capability;
pub mod token;
