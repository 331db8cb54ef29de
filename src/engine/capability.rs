// ==========================================
// 数控加工执行闭环 - 工序能力估算
// ==========================================
// 归一化: z = (measured − target) / tolerance，公差带映射为 [−1, 1]
// Cpk = min(1 − μ, 1 + μ) / (3σ)，σ 为样本标准差
// σ≈0 时: |μ| ≤ 1 取上限 3.0，否则 0.0
// 样本不足 2 个时使用回退值
// ==========================================

use crate::domain::inspection::Inspection;

/// σ≈0 时的 Cpk 上限
pub const CPK_CEILING: f64 = 3.0;

const SIGMA_EPSILON: f64 = 1e-12;

/// 能力估算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityEstimate {
    pub cpk: f64,
    pub samples: usize,
    /// 样本不足，使用了回退值
    pub fallback: bool,
}

/// 对批次全部检验的测量项估算 Cpk（忽略公差为 0 的项）
pub fn estimate_cpk(inspections: &[Inspection], fallback_cpk: f64) -> CapabilityEstimate {
    let z: Vec<f64> = inspections
        .iter()
        .flat_map(|i| i.results.iter())
        .filter(|r| r.tolerance > 0.0)
        .map(|r| r.deviation() / r.tolerance)
        .collect();
    estimate_from_normalized(&z, fallback_cpk)
}

pub fn estimate_from_normalized(z: &[f64], fallback_cpk: f64) -> CapabilityEstimate {
    let n = z.len();
    if n < 2 {
        return CapabilityEstimate {
            cpk: fallback_cpk,
            samples: n,
            fallback: true,
        };
    }

    let mean = z.iter().sum::<f64>() / n as f64;
    let variance = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let sigma = variance.sqrt();

    let cpk = if sigma < SIGMA_EPSILON {
        if mean.abs() <= 1.0 {
            CPK_CEILING
        } else {
            0.0
        }
    } else {
        (1.0 - mean).min(1.0 + mean) / (3.0 * sigma)
    };

    CapabilityEstimate {
        cpk,
        samples: n,
        fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inspection::MeasurementResult;

    #[test]
    fn test_fallback_below_two_samples() {
        let est = estimate_from_normalized(&[0.2], 1.5);
        assert!(est.fallback);
        assert_eq!(est.cpk, 1.5);
        assert_eq!(estimate_from_normalized(&[], 1.5).samples, 0);
    }

    #[test]
    fn test_centered_spread() {
        // μ = 0, σ = 0.2
        let est = estimate_from_normalized(&[-0.2, 0.0, 0.2], 1.5);
        assert!(!est.fallback);
        assert!((est.cpk - 1.0 / 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_off_center_uses_nearer_limit() {
        // μ = 0.5, σ = 0.1 → min(0.5, 1.5) / 0.3
        let est = estimate_from_normalized(&[0.4, 0.5, 0.6], 1.5);
        assert!((est.cpk - 0.5 / 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_zero_sigma() {
        assert_eq!(estimate_from_normalized(&[0.3, 0.3], 1.5).cpk, CPK_CEILING);
        assert_eq!(estimate_from_normalized(&[1.4, 1.4], 1.5).cpk, 0.0);
    }

    #[test]
    fn test_zero_tolerance_items_ignored() {
        let mut insp = Inspection::new("order-1", "LOT", "qa");
        insp.add_measurement(MeasurementResult::evaluate("flag", 1.0, 1.0, 0.0, "-"));
        insp.add_measurement(MeasurementResult::evaluate("dia", 10.01, 10.0, 0.05, "mm"));
        let est = estimate_cpk(&[insp], 1.5);
        assert_eq!(est.samples, 1);
        assert!(est.fallback);
    }
}
