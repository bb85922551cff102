// # Generation Runner Trait
//
// Defines the payload driven by the `Supervisor`: one server generation.
//
// ## Implementations
//
// - HTTP control surface + reconciliation loop: `ddnsd` crate
//
// ## Usage
//
// ```rust,ignore
// struct MyRunner;
//
// #[async_trait::async_trait]
// impl GenerationRunner for MyRunner {
//     async fn run(&self, ctx: GenerationContext, settings: Arc<Settings>) -> Result<()> {
//         let listener = bind(settings.http).await?;
//         tokio::select! {
//             _ = serve(listener) => {}
//             _ = ctx.cancelled() => {}
//         }
//         Ok(())
//     }
// }
// ```

use crate::config::Settings;
use crate::supervisor::GenerationContext;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for generation runner implementations
///
/// # Contract
///
/// - Runs until `ctx` is cancelled, or until a fatal local error occurs
/// - Observes cancellation cooperatively and returns promptly; any shutdown
///   grace period is bounded by the runner itself
/// - Never outlives its call: all tasks spawned for a generation must have
///   finished when `run` returns
///
/// The supervisor does not inspect the runner beyond "has it returned yet".
/// A runner returning `Err` before cancellation is logged as a runner failure;
/// the supervisor keeps ownership of what happens next.
#[async_trait]
pub trait GenerationRunner: Send + Sync + 'static {
    /// Run one generation until cancelled
    ///
    /// # Parameters
    ///
    /// - `ctx`: Cancellable context of this generation
    /// - `settings`: Settings snapshot the generation was started with
    async fn run(
        &self,
        ctx: GenerationContext,
        settings: Arc<Settings>,
    ) -> Result<(), crate::Error>;
}
