// 基本データ型（ID、ベクトル、位置レコード）
pub mod common;

// 地形・迎撃計算の戦略インターフェース（trait）定義
pub mod traits;

// 戦闘管理が参照するレコード
pub mod track;
pub mod weapon;
pub mod asset;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use track::{IffType, TrackDb, TrackRecord};
pub use weapon::{WeaponCategory, WeaponRecord, WeaponRef};
pub use asset::{AssetMap, AssetRecord, SystemStatus};
