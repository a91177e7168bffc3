use crate::models::{PositionRecord, TerrainInterface};

/// 地形なしエンジン
///
/// 標高は常に0m、見通し線は常に遮られません。
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTerrainEngine;

impl TerrainInterface for NullTerrainEngine {
    fn elevation(&self, _position: &PositionRecord) -> f64 {
        0.0
    }

    fn is_los_masked(&self, _from: &PositionRecord, _to: &PositionRecord, _ignore_features: bool) -> bool {
        false
    }
}
