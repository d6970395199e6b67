pub mod customers;
pub mod ledger;
pub mod orders;
pub mod products;
pub mod settlement;
pub mod warehouses;

pub use customers::CustomerService;
pub use ledger::StockLedgerService;
pub use orders::OrderService;
pub use products::ProductService;
pub use warehouses::WarehouseService;
