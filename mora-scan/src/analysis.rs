//! Scan analysis.
//!
//! Only a stub exists: [`MockAnalyzer`] returns canned findings so the
//! mobile client has a realistic response shape to render.

use async_trait::async_trait;
use chrono::{Local, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::Frame;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub findings: String,
    /// Percent
    pub confidence: u8,
    pub risk_level: String,
    pub recommendation: String,
    pub analysis_id: String,
    pub timestamp: String,
    pub backend: String,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, frame: &Frame) -> Result<AnalysisResult>;

    fn name(&self) -> &'static str;
}

const FINDINGS: &[&str] = &[
    "No significant abnormalities detected",
    "Minor tissue density variations observed",
    "Normal breast tissue architecture",
    "No suspicious masses or calcifications",
    "Symmetrical breast tissue distribution",
];

// Only the three lowest levels are ever reported by the stub
const RISK_LEVELS: &[&str] = &["Low", "Low-Medium", "Medium"];

const RECOMMENDATIONS: &[&str] = &[
    "Continue with regular self-examinations. Schedule follow-up in 6 months.",
    "Monitor for any changes. Consider follow-up scan in 3 months.",
    "Maintain current screening schedule. No immediate action required.",
    "Continue healthy lifestyle practices. Annual screening recommended.",
    "Schedule consultation with healthcare provider for personalized advice.",
];

/// Canned findings, confidence 80..=98.
pub struct MockAnalyzer {
    rng: Mutex<StdRng>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence, for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn pick(rng: &mut StdRng, options: &[&str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, frame: &Frame) -> Result<AnalysisResult> {
        let mut rng = self.rng.lock();
        let result = AnalysisResult {
            findings: pick(&mut rng, FINDINGS),
            confidence: rng.gen_range(80..=98),
            risk_level: pick(&mut rng, RISK_LEVELS),
            recommendation: pick(&mut rng, RECOMMENDATIONS),
            analysis_id: format!("ai_{}", Local::now().format("%Y%m%d_%H%M%S_%6f")),
            timestamp: Utc::now().to_rfc3339(),
            backend: "mock".to_string(),
        };
        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            analysis_id = %result.analysis_id,
            "Mock analysis produced"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::gradient;

    #[tokio::test]
    async fn test_mock_results_stay_in_range() {
        let analyzer = MockAnalyzer::seeded(7);
        let frame = gradient(2, 2);
        for _ in 0..50 {
            let r = analyzer.analyze(&frame).await.unwrap();
            assert!((80..=98).contains(&r.confidence));
            assert!(FINDINGS.contains(&r.findings.as_str()));
            assert!(RISK_LEVELS.contains(&r.risk_level.as_str()));
            assert!(RECOMMENDATIONS.contains(&r.recommendation.as_str()));
            assert!(r.analysis_id.starts_with("ai_"));
        }
    }

    #[tokio::test]
    async fn test_seeded_is_reproducible() {
        let frame = gradient(2, 2);
        let a = MockAnalyzer::seeded(42).analyze(&frame).await.unwrap();
        let b = MockAnalyzer::seeded(42).analyze(&frame).await.unwrap();
        assert_eq!(a.findings, b.findings);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_serializes_camel_case() {
        let r = AnalysisResult {
            findings: "f".into(),
            confidence: 90,
            risk_level: "Low".into(),
            recommendation: "r".into(),
            analysis_id: "ai_1".into(),
            timestamp: "t".into(),
            backend: "mock".into(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["riskLevel"], "Low");
        assert_eq!(json["analysisId"], "ai_1");
    }
}
