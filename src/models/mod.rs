// src/models/mod.rs

pub mod auth_token;
pub mod customer;
pub mod loan;
pub mod money;
