mod analysis;

pub use analysis::AnalysisService;
