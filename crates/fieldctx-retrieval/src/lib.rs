//! fieldctx-retrieval
//!
//! Hybrid retrieval and context assembly for one extraction field: lexical and
//! semantic candidate retrieval, score combination with a consensus boost, and
//! the fixed post-processing chain that shapes the final context.

pub mod combiner;
pub mod lexical;
pub mod normalize;
pub mod orchestrator;
pub mod postprocess;
pub mod semantic;
pub mod strategy;

mod timeout;

pub use combiner::ScoreCombiner;
pub use lexical::LexicalRetriever;
pub use orchestrator::{RetrievalOrchestrator, RetrievalPhase};
pub use postprocess::PostProcessingChain;
pub use semantic::SemanticRetriever;
pub use strategy::{NativeHybridStrategy, RetrievalStrategy, TwoPhaseStrategy};
