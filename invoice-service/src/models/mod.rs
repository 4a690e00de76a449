//! Data models for invoice-service.

mod client;
mod invoice;
mod product;

pub use client::{Client, NewClient};
pub use invoice::{Invoice, InvoiceLine, InvoiceSummary, NewInvoice, NewInvoiceLine};
pub use product::{NewProduct, Product};
