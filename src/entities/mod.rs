pub mod customer;
pub mod order;
pub mod order_line;
pub mod product;
pub mod stock_allocation;
pub mod stock_batch;
pub mod stock_transfer;
pub mod warehouse;
