pub mod lifecycle;
pub mod reconciler;

pub use lifecycle::LifecycleController;
pub use reconciler::ReadingReconciler;
