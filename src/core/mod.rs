//! 核心层：任务模型、编排状态机、并发协调与优雅关闭

pub mod coordination;
pub mod error;
pub mod orchestrator;
pub mod shutdown;
pub mod state;
pub mod task;

pub use coordination::{
    CoordinationManager, CoordinationSnapshot, CoordinationTask, TaskStatus, WorkResult,
};
pub use error::{CoordinationError, OrchestrationError, RegistryError};
pub use orchestrator::{parse_routing_decision, Orchestrator, RoutingDecision};
pub use shutdown::{ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{OrchestrationRun, RunPhase, NO_RESPONSE};
pub use task::{HandlerResult, HandlerStatus, Priority, TaskRequest};
