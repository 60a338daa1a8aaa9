//! Sample - 采集输出
//!
//! 单个带时间戳的运动传感器样本。

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::ContractError;

type LabelGroups = &'static [(&'static str, &'static [&'static str])];

const ACC_LABELS: LabelGroups = &[("Acc", &["X", "Y", "Z"])];
const ACC_GYRO_LABELS: LabelGroups = &[("Acc", &["X", "Y", "Z"]), ("Gyro", &["X", "Y", "Z"])];
const QUAT_LABELS: LabelGroups = &[("Quat", &["W", "X", "Y", "Z"])];

/// 样本通道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// 线性加速度 x, y, z
    #[default]
    Acceleration,
    /// 加速度 x, y, z + 陀螺仪 x, y, z
    AccelerationGyro,
    /// 归一化旋转四元数 w, x, y, z
    Quaternion,
}

impl ChannelKind {
    /// Number of channel values a sample of this kind carries
    pub fn channel_count(self) -> usize {
        match self {
            Self::Acceleration => 3,
            Self::AccelerationGyro => 6,
            Self::Quaternion => 4,
        }
    }

    /// Config/metrics name (`acceleration`, `acceleration_gyro`, `quaternion`)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acceleration => "acceleration",
            Self::AccelerationGyro => "acceleration_gyro",
            Self::Quaternion => "quaternion",
        }
    }

    /// Decimal digits used on the wire
    pub fn wire_precision(self) -> usize {
        match self {
            Self::Acceleration | Self::AccelerationGyro => 2,
            Self::Quaternion => 4,
        }
    }

    /// (group label, channel labels) used by the human-readable file format
    fn label_groups(self) -> LabelGroups {
        match self {
            Self::Acceleration => ACC_LABELS,
            Self::AccelerationGyro => ACC_GYRO_LABELS,
            Self::Quaternion => QUAT_LABELS,
        }
    }
}

/// 运动传感器样本
///
/// 由外部生产者创建，创建后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// 采集时间戳 (seconds)
    timestamp: f64,

    /// 通道布局
    kind: ChannelKind,

    /// 通道数值 (顺序有意义)
    values: Vec<f64>,
}

impl Sample {
    /// Create a sample, checking the channel count against `kind`
    pub fn new(kind: ChannelKind, timestamp: f64, values: Vec<f64>) -> Result<Self, ContractError> {
        if values.len() != kind.channel_count() {
            return Err(ContractError::invalid_sample(format!(
                "{:?} expects {} channels, got {}",
                kind,
                kind.channel_count(),
                values.len()
            )));
        }
        Ok(Self {
            timestamp,
            kind,
            values,
        })
    }

    /// Accelerometer-only sample
    pub fn acceleration(timestamp: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp,
            kind: ChannelKind::Acceleration,
            values: vec![x, y, z],
        }
    }

    /// Accelerometer + gyroscope sample
    pub fn acceleration_gyro(timestamp: f64, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        let mut values = Vec::with_capacity(6);
        values.extend_from_slice(&accel);
        values.extend_from_slice(&gyro);
        Self {
            timestamp,
            kind: ChannelKind::AccelerationGyro,
            values,
        }
    }

    /// Rotation quaternion sample (w, x, y, z)
    pub fn quaternion(timestamp: f64, w: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp,
            kind: ChannelKind::Quaternion,
            values: vec![w, x, y, z],
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Render the wire line: comma-separated values at the kind's precision, `\n` terminated
    ///
    /// `Sample::acceleration(0.0, 1.0, 2.0, 3.0)` renders as `1.00,2.00,3.00\n`.
    pub fn to_wire_line(&self) -> String {
        let precision = self.kind.wire_precision();
        let mut line = String::with_capacity(self.values.len() * 8);
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                line.push(',');
            }
            let _ = write!(line, "{value:.precision$}");
        }
        line.push('\n');
        line
    }

    /// Render the labelled file line, e.g. `Acc: X=1.000000, Y=2.000000, Z=3.000000\n`
    pub fn to_file_line(&self, precision: usize) -> String {
        let mut line = String::with_capacity(self.values.len() * 16);
        let mut values = self.values.iter();
        for (group_idx, (group, labels)) in self.kind.label_groups().iter().enumerate() {
            if group_idx > 0 {
                line.push_str(", ");
            }
            line.push_str(group);
            line.push_str(": ");
            for (idx, label) in labels.iter().enumerate() {
                if idx > 0 {
                    line.push_str(", ");
                }
                let value = values.next().copied().unwrap_or_default();
                let _ = write!(line, "{label}={value:.precision$}");
            }
        }
        line.push('\n');
        line
    }
}
