//! # danci-bkt - 知识追踪参数估计库
//!
//! Offline estimation of Bayesian Knowledge Tracing (BKT) parameters for
//! grammar points and words, from per-user progress records:
//!
//! - **Sequence construction** - ordered attempt sequences per user, with a
//!   seeded fallback ordering when only success/failure counts are known
//! - **EM fitting** - scaled forward-backward over a two-state HMM, multiple
//!   seeded restarts run in parallel, label-switch correction and clamping
//! - **Aggregation** - per-category means, grammar vs word comparison,
//!   comparison with level defaults, exported report
//! - **Simulation** - generative learning sequences and synthetic datasets
//!
//! ## 模块结构
//!
//! - [`records`] - 输入记录与按技能分组
//! - [`sequence`] - 观测序列构建
//! - [`simulator`] - 学习序列模拟
//! - [`hmm`] - 前向后向算法与充分统计量
//! - [`fitter`] - EM 参数拟合
//! - [`tracer`] - 掌握度更新
//! - [`aggregate`] - 汇总与报告
//! - [`pipeline`] - 并行分析流水线
//! - [`synthetic`] - 合成数据生成
//! - [`sanitize`] - 数值清洗、参数边界与标签交换
//! - [`types`] - 公共类型和常量
//!
//! ## 使用示例
//!
//! ```rust
//! use danci_bkt::{group_by_skill, AnalysisPipeline, FitterConfig, SkillCategory, SkillRecord};
//!
//! let records = vec![
//!     SkillRecord::from_sequence("u1", "G1", vec![1, 1, 0, 1]),
//!     SkillRecord::from_sequence("u2", "G1", vec![0, 1, 1, 1]),
//!     SkillRecord::from_sequence("u3", "G1", vec![1, 0, 1, 1]),
//! ];
//! let grouped = group_by_skill(records);
//! let outcome = AnalysisPipeline::new(FitterConfig::default()).analyze(&grouped, SkillCategory::Grammar);
//! assert_eq!(outcome.results.len(), 1);
//! ```

// ============================================================================
// 模块声明
// ============================================================================

pub mod aggregate;
pub mod error;
pub mod fitter;
pub mod hmm;
pub mod pipeline;
pub mod records;
pub mod sanitize;
pub mod sequence;
pub mod simulator;
pub mod synthetic;
pub mod tracer;
pub mod types;

// ============================================================================
// 重新导出
// ============================================================================

/// 重新导出所有公共类型
pub use types::*;

/// 重新导出错误类型
pub use error::{BktError, Result};

/// 重新导出输入记录
pub use records::{
    group_by_skill, group_by_skill_with_limit, Attempts, GroupedRecords, SkillRecord, UserAttempts,
};

/// 重新导出序列构建与模拟
pub use sequence::{skill_seed, SequenceBuilder};
pub use simulator::{LearningSequenceSimulator, SimulationConfig};

/// 重新导出拟合器
pub use fitter::{BktFitter, Fidelity, FitterConfig, RestartOutcome};
pub use sanitize::{normalize_labels, Bound, ParameterBounds};

/// 重新导出汇总与流水线
pub use aggregate::{
    compare_categories, compare_with_defaults, summarize, AnalysisReport, CategoryComparison,
    CategorySummary, ChangeDirection, ComparisonVerdict, ParameterChange, ReportItem,
};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline};

/// 重新导出追踪与合成数据
pub use synthetic::{GeneratorConfig, SyntheticDataset, SyntheticGenerator, SyntheticRecord};
pub use tracer::KnowledgeTracer;
