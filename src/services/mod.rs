pub mod collector;
pub mod delivery;
pub mod dispatcher;
pub mod renderer;
pub mod report_job;
pub mod report_schedule_service;
pub mod run_recorder;
pub mod runtime;
pub mod worker_pool;

pub use collector::Collector;
pub use delivery::DeliveryService;
pub use dispatcher::Dispatcher;
pub use renderer::RendererRegistry;
pub use report_job::ReportJob;
pub use report_schedule_service::ReportScheduleService;
pub use run_recorder::RunRecorder;
pub use runtime::{ReportsRuntime, RuntimePorts};
pub use worker_pool::{JobExecutor, WorkerPool, WorkerPoolConfig};
