//! エラー型定義
//!
//! 設定エラーは `scenario::ScenarioError`、ワイヤ形式の復号エラーは
//! `messages::wire::WireError` に置き、ここには呼び出し側の誤用
//! （不変条件違反）を表すエラーをまとめます。迎撃不能などの実行時の
//! 不成立はエラーではなく、ペアリングの失敗理由として扱います。

use thiserror::Error;

use crate::models::IdRecord;

/// 不変条件違反エラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IadsError {
    /// 終端ステータス後の状態遷移
    #[error("assignment {track} is already terminal ({current}); rejected transition to {requested}")]
    TerminalStatus {
        track: IdRecord,
        current: String,
        requested: String,
    },

    /// 最適化前の割り当て参照
    #[error("assessment matrix queried before optimize()")]
    MatrixNotSolved,

    /// 行インデックス範囲外
    #[error("row {row} out of range ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },

    /// 優先度順でないペアリング追加
    #[error("pairing for track {track} added out of priority order (priority {priority} after {previous})")]
    PairingOutOfOrder {
        track: IdRecord,
        priority: f64,
        previous: f64,
    },

    /// 未登録の武器参照
    #[error("unknown weapon {weapon} on asset {asset}")]
    UnknownWeapon { asset: IdRecord, weapon: IdRecord },

    /// 武器またはアセットに割り当て余力がない
    #[error("weapon {weapon} on asset {asset} has no available capacity")]
    NoCapacity { asset: IdRecord, weapon: IdRecord },

    /// 未登録のアセット参照
    #[error("unknown asset {0}")]
    UnknownAsset(IdRecord),

    /// 未登録の割り当て参照
    #[error("no assignment for track {0}")]
    UnknownAssignment(IdRecord),

    /// 不正なステータス文字列
    #[error("invalid assignment status '{0}'")]
    InvalidStatus(String),

    /// 不正な射撃ドクトリン文字列
    #[error("invalid shot doctrine '{0}'")]
    InvalidShotDoctrine(String),

    /// 不正な引数
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// IADS処理の結果型
pub type Result<T> = std::result::Result<T, IadsError>;
