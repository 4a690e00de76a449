//! Boundary DTOs for invoice-service.

mod invoices;

pub use invoices::{
    ClientPayload, CreateInvoiceRequest, CreateInvoiceResponse, FindProductParams, LinePayload,
    SearchParams,
};
