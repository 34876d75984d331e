use thiserror::Error;

// エンジン層（篩コア / スケジューラ / 検証）で共有するエラー型と進捗情報の定義。
//
// - このモジュールの型は呼び出し側との「進捗・ETA 契約」の一部です。
// - 特に `Progress` のフィールド意味は表示側に直結するため、互換性を壊さないようにしてください。

/// エンジン共通のエラー型。
///
/// - 設定と範囲の検証は篩い開始前に行われ、違反はここのバリアントで即座に返ります。
/// - `Allocation` は Big 階層のバケットチャンク確保に失敗した場合で、
///   そのサブ区間の担当スレッドだけが中断します（他のサブ区間は壊れません）。
#[derive(Debug, Error)]
pub enum SieveError {
    /// stop < start、または stop がサポート上限を超えている。
    #[error("invalid range: {0}")]
    InvalidRange(String),
    /// セグメントサイズやプリシーブ上限が文書化された境界の外にある。
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// バケットチャンクのメモリ確保に失敗した。
    #[error("bucket allocation failed: {0}")]
    Allocation(#[from] std::collections::TryReserveError),
    /// 生成結果の検証（単調性・末尾サンプルの素数性）に失敗した。
    #[error("verification failed: {0}")]
    Verification(String),
}

/// エンジン共通の結果型。
///
/// - すべての長時間実行タスク（素数生成、個数計算、検証処理など）はこの型を返します。
pub type SieveResult<T> = Result<T, SieveError>;

/// 素数生成処理の進捗情報。
///
/// 呼び出し側とは次の「契約」を満たす必要があります:
/// - `processed` と `total` は単調に増加する（逆戻りしない）こと
/// - `processed <= total` を維持すること（ETA 計算で使用）
/// - `eta_secs` は「残り時間の概算」であり、`None` の場合は「まだ計算できない」ことを意味すること
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// これまでに処理した値の個数。
    pub processed: u64,
    /// 全体として処理する予定の値の個数。
    pub total: u64,
    /// 推定残り時間（秒）。まだ計算できない場合は None。
    pub eta_secs: Option<u64>,
}

/// 現在の進捗と経過時間から ETA（残り時間の秒数）を推定するユーティリティ。
///
/// - `processed` / `total` は 0 以上で、`processed <= total` を想定しています。
/// - 進捗 0% の間は `None` を返し、ある程度進んでから ETA を表示する前提です。
pub fn compute_eta(processed: u64, total: u64, elapsed_secs: f64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    let progress = processed.min(total) as f64 / total as f64;
    if progress > 0.0 {
        let total_time = elapsed_secs / progress;
        Some(((total_time - elapsed_secs).max(0.0)).round() as u64)
    } else {
        None
    }
}
