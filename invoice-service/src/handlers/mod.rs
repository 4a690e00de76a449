//! HTTP handlers for invoice-service.

pub mod clients;
pub mod health;
pub mod invoices;
pub mod products;
