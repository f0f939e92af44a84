//! Hierarchical Retrieval-Augmented Generation engine.
//!
//! Six cascade levels, each a [`podwise_core::Level`], run in order under
//! a [`controller::HierarchicalController`]:
//! - L1 [`l1_query_rewriter::QueryRewriter`] — query understanding
//! - L2 [`l2_hybrid_searcher::HybridSearcher`] — dense/sparse/semantic fusion
//! - L3 [`l3_context_augmenter::ContextAugmenter`] — neighbor-chunk context
//! - L4 [`l4_reranker::Reranker`] — weighted rerank + diversity pass
//! - L5 [`l5_context_compressor::ContextCompressor`] — filler/length trim
//! - L6 [`l6_hybrid_generator::HybridGenerator`] — dual-model generation
//!
//! [`evaluator::Evaluator`] scores answers offline and compares backends.

pub mod controller;
pub mod evaluator;
pub mod l1_query_rewriter;
pub mod l2_hybrid_searcher;
pub mod l3_context_augmenter;
pub mod l4_reranker;
pub mod l5_context_compressor;
pub mod l6_hybrid_generator;

pub use controller::{HierarchicalController, QueryRequest};
pub use evaluator::{ComparisonReport, EvaluationScores, Evaluator};
pub use l1_query_rewriter::{QueryRewriter, QueryRewriterConfig, MAX_QUERY_CHARS};
pub use l2_hybrid_searcher::{HybridSearcher, HybridSearcherConfig};
pub use l3_context_augmenter::{ContextAugmenter, ContextAugmenterConfig};
pub use l4_reranker::{Reranker, RerankerConfig};
pub use l5_context_compressor::{ContextCompressor, ContextCompressorConfig};
pub use l6_hybrid_generator::{HybridGenerator, HybridGeneratorConfig};
