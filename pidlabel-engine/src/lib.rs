pub mod classify;
pub mod corrections;
pub mod extent;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod reassemble;
pub mod transform;

pub mod errors {
    use std::path::PathBuf;

    use pidlabel_io::IoError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum FrameError {
        #[error("未找到图框（3DFACE、图签块、闭合多段线或水平线均不可用）")]
        NoFrameFound,
        #[error("图框尺寸无效: 宽 {width}，高 {height}")]
        InvalidDimensions { width: f64, height: f64 },
    }

    #[derive(Debug, Error)]
    pub enum CorrectionError {
        #[error("修正偏移 {offset} 超出允许范围 ±{limit}")]
        OffsetOutOfRange { offset: f64, limit: f64 },
        #[error("修正偏移不是有限数值")]
        NonFiniteOffset,
    }

    /// 单张图纸失败的类别，批处理据此汇总。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ErrorKind {
        IoFailure,
        CorruptDocument,
        NoFrameFound,
        Output,
    }

    #[derive(Debug, Error)]
    pub enum PipelineError {
        #[error("读取图纸失败: {0}")]
        Load(#[source] IoError),
        #[error(transparent)]
        Frame(#[from] FrameError),
        #[error("栅格尺寸无效: {width_px}x{height_px}")]
        InvalidRaster { width_px: u32, height_px: u32 },
        #[error("写出 {path:?} 失败: {source}")]
        Output {
            path: PathBuf,
            #[source]
            source: csv::Error,
        },
    }

    impl PipelineError {
        pub fn kind(&self) -> ErrorKind {
            match self {
                PipelineError::Load(IoError::Read { .. }) => ErrorKind::IoFailure,
                PipelineError::Load(IoError::InvalidDocument(_)) => ErrorKind::CorruptDocument,
                PipelineError::Frame(_) => ErrorKind::NoFrameFound,
                PipelineError::InvalidRaster { .. } | PipelineError::Output { .. } => {
                    ErrorKind::Output
                }
            }
        }
    }

    impl From<IoError> for PipelineError {
        fn from(value: IoError) -> Self {
            PipelineError::Load(value)
        }
    }
}

/// 按十进制位数四舍五入（远离零）。
#[inline]
pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// 向上取整到指定小数位。
#[inline]
pub(crate) fn round_up_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    settle(value * factor).ceil() / factor
}

/// 向下取整到指定小数位。
#[inline]
pub(crate) fn round_down_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    settle(value * factor).floor() / factor
}

// 消除 0.124 * 1000 = 123.99999999999999 一类的表示误差
#[inline]
fn settle(scaled: f64) -> f64 {
    (scaled * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_helpers_respect_direction() {
        assert!((round_to(0.12345, 3) - 0.123).abs() < 1e-12);
        assert!((round_to(-0.1236, 3) + 0.124).abs() < 1e-12);
        assert!((round_up_to(0.1231, 3) - 0.124).abs() < 1e-12);
        assert!((round_down_to(0.1239, 3) - 0.123).abs() < 1e-12);
        assert!((round_up_to(0.124, 3) - 0.124).abs() < 1e-12);
        assert!((round_down_to(0.3, 3) - 0.3).abs() < 1e-12);
    }
}
