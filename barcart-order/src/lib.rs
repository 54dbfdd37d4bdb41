pub mod error;
pub mod models;
pub mod metadata;
pub mod allocation;
pub mod partition;
pub mod orchestrator;
pub mod checkout;
pub mod fulfillment;
pub mod settlement;
pub mod materializer;
pub mod tax;
pub mod fees;
pub mod mock;

pub use error::CheckoutError;
pub use models::{
    CheckoutRequest, ConfirmOrderRequest, CreatedOrder, MaterializationReport, SideEffectOutcome,
    StoreGroup,
};
pub use partition::{CartPartitioner, PartitionedCart};
pub use orchestrator::PaymentOrchestrator;
pub use checkout::{CheckoutService, CheckoutSummary};
pub use fulfillment::DeliveryDispatcher;
pub use materializer::OrderMaterializer;
pub use tax::StateTaxTable;
pub use fees::{FeeRule, FeeSchedule};
