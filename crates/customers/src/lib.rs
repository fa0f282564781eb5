//! Customers domain module.
//!
//! This crate contains business rules for the people and agents bills are
//! sold to, together with their running transaction statistics, implemented
//! purely as deterministic domain logic (no IO, no storage).

pub mod customer;

pub use customer::{
    ContactInfo, Customer, CustomerFilter, CustomerStats, CustomerType, CustomerUpdate,
    NewCustomer,
};
