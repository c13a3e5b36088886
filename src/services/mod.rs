pub mod bulk_importer;
pub mod config_consistency_service;
pub mod config_validation_service;
pub mod incident_service;
pub mod market_price_admin_service;
pub mod market_price_validator;
pub mod metrics_reporter;
pub mod quality_scorer;
pub mod recompute_service;
pub mod retry_executor;
pub mod retry_orchestrator;
