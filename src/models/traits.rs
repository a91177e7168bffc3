use tracing::warn;

use crate::models::common::PositionRecord;
use crate::models::track::TrackRecord;
use crate::models::weapon::WeaponRecord;

/// 地形インターフェース
///
/// 標高と見通し線（LOS）遮蔽の問い合わせを提供します。実装が
/// ディスクやネットワークを使う場合でも、呼び出しは同期的に扱われます。
pub trait TerrainInterface {
    /// 指定位置の標高（メートル）
    ///
    /// 既定実装は警告を出して0を返します。
    fn elevation(&self, position: &PositionRecord) -> f64 {
        warn!(
            lat = position.lat_deg(),
            lon = position.lon_deg(),
            "TerrainInterface::elevation が実装されていません。0mを返します"
        );
        0.0
    }

    /// 2点間の見通し線が地形で遮られているか
    fn is_los_masked(&self, from: &PositionRecord, to: &PositionRecord, ignore_features: bool) -> bool;
}

/// 迎撃解
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterceptSolution {
    /// 迎撃までの時間（秒）
    pub time_s: f64,
    pub point: PositionRecord,
    pub pk: f64,
    /// この幾何条件での最大射程（m）
    pub max_range_m: f64,
}

/// 迎撃計算インターフェース
///
/// 飛行特性の仮定が異なる実装を差し替えられるようにするための戦略です。
/// 迎撃不能は `None` で表します。
pub trait InterceptCalculator {
    fn can_intercept(
        &self,
        track: &TrackRecord,
        weapon: &WeaponRecord,
        weapon_position: &PositionRecord,
    ) -> Option<InterceptSolution>;
}
