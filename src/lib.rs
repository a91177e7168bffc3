//! # iadsc2
//!
//! 統合防空システム（IADS）の指揮統制コアです。
//!
//! 戦闘管理（BM）は1サイクルごとに、トラックと武器の全組み合わせについて
//! 迎撃可否・武器テーブル・資源を判定してスコアを付け、貪欲法または
//! ハンガリアン法で割り当てを決めます。割り当て・ACK・キュー・戦闘ステータスは
//! ビッグエンディアンのワイヤ形式で送受信します。

pub mod error;

// 基本レコードと戦略インターフェース
pub mod models;
pub mod geodesy;
pub mod intercept;
pub mod terrain;

// 戦闘管理の中核
pub mod weapon_table;
pub mod pairing;
pub mod scoring_matrix;
pub mod munkres;
pub mod exclusion;
pub mod messages;
pub mod battle_manager;

// ホスト（シナリオ実行）
pub mod scenario;
pub mod simulation;
pub mod logging;

pub use error::{IadsError, Result};
