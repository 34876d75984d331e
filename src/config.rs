use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::engine_types::{SieveError, SieveResult};

// ========== チューニング定数 ==========

/// セグメントサイズの下限（KB）。
pub const MIN_SEGMENT_KB: u64 = 1;
/// セグメントサイズの上限（KB）。
pub const MAX_SEGMENT_KB: u64 = 2048;
/// メインの篩の既定セグメントサイズ（KB）。L1/L2 データキャッシュの目安。
pub const DEFAULT_SEGMENT_KB: u64 = 256;
/// 篩い素数を生成する入れ子の篩のセグメントサイズ（バイト）。
pub const GENERATOR_SEGMENT_BYTES: usize = 32 * 1024;

/// プリシーブ上限の下限値。
pub const MIN_PRESIEVE: u64 = 13;
/// プリシーブ上限の上限値。
pub const MAX_PRESIEVE: u64 = 23;
/// 既定のプリシーブ上限。この値以下の素数の倍数はパターンコピーで除去される。
pub const DEFAULT_PRESIEVE: u64 = 19;
/// プリシーブが有効化されない場合でも最低限パターン化する素数。
pub const PRESIEVE_MIN_PRIME: u64 = 7;
/// 篩う区間の長さがこの値未満の間はフルのプリシーブパターンを構築しない。
/// パターン構築には固定の初期化コストがあり、大きな区間でしか元が取れない。
pub const PRESIEVE_THRESHOLD: u64 = 100_000_000;

/// Big 階層のバケット 1 個あたりの篩い素数の個数。
pub const BUCKET_SIZE: usize = 1 << 10;
/// Big 階層がバケットを使い切ったとき、一度に確保するメモリ量（バイト）。
pub const BYTES_PER_ALLOC: usize = (1 << 20) * 8;

/// 素数 p <= セグメントバイト数 * FACTOR_SMALL は Small 階層で処理する。
pub const FACTOR_SMALL: f64 = 0.5;
/// 素数 p <= セグメントバイト数 * FACTOR_MEDIUM（かつ Small 超）は Medium 階層で処理する。
pub const FACTOR_MEDIUM: f64 = 2.5;

/// 1 スレッドが一度に篩う区間の最小長。初期化オーバーヘッドを抑える。
pub const MIN_THREAD_INTERVAL: u64 = 10_000_000;
/// 1 スレッドが一度に篩う区間の最大長。終盤のロードインバランスを防ぐ。
pub const MAX_THREAD_INTERVAL: u64 = 20_000_000_000;
/// ガイド付きスケジューリングの分配係数。次の区間長は
/// 残り範囲 / (係数 * スレッド数) をクランプした値になる。
pub const THREAD_SPREAD_FACTOR: u64 = 4;

/// ブートストラップをこの値以下の範囲では単純な配列篩で済ませる。
/// sqrt(sqrt(2^63)) を超えていれば再帰は 2 段で必ず底に着く。
pub const TINY_SIEVE_LIMIT: u64 = 1 << 16;

/// サポートする stop の最大値。これを超えると最大の篩い素数の
/// p * p が 64bit に収まらなくなる。
pub const MAX_STOP: u64 = 1 << 63;

// ========== 設定 ==========

/// エンジンのチューニング設定。篩う範囲は各 API の引数であり、ここには含めない。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// セグメントサイズ（KB）。0 のときはメモリ状況から自動決定する。
    #[serde(default)]
    pub segment_size_kb: u64,
    /// プリシーブ上限。この値以下の素数はパターンコピーで消し込む。
    #[serde(default = "default_pre_sieve_limit")]
    pub pre_sieve_limit: u64,
    /// ワーカースレッド数。0 のときは rayon の既定（全コア）を使う。
    #[serde(default)]
    pub thread_count: usize,
    /// セグメントサイズ自動決定時に使うシステムメモリの割合（10.0〜90.0）。
    #[serde(default = "default_memory_usage_percent")]
    pub memory_usage_percent: f64,
}

fn default_pre_sieve_limit() -> u64 {
    DEFAULT_PRESIEVE
}

fn default_memory_usage_percent() -> f64 {
    50.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_size_kb: 0,
            pre_sieve_limit: DEFAULT_PRESIEVE,
            thread_count: 0,
            memory_usage_percent: default_memory_usage_percent(),
        }
    }
}

impl Config {
    /// 設定値の境界チェック。篩い開始前に必ず呼ばれ、違反は即エラーになる。
    pub fn validate(&self) -> SieveResult<()> {
        if self.segment_size_kb != 0
            && !(MIN_SEGMENT_KB..=MAX_SEGMENT_KB).contains(&self.segment_size_kb)
        {
            return Err(SieveError::InvalidConfig(format!(
                "segment_size_kb must be 0 (auto) or within {MIN_SEGMENT_KB}..={MAX_SEGMENT_KB}, got {}",
                self.segment_size_kb
            )));
        }
        if !(MIN_PRESIEVE..=MAX_PRESIEVE).contains(&self.pre_sieve_limit) {
            return Err(SieveError::InvalidConfig(format!(
                "pre_sieve_limit must be within {MIN_PRESIEVE}..={MAX_PRESIEVE}, got {}",
                self.pre_sieve_limit
            )));
        }
        Ok(())
    }
}

const SETTINGS_FILE: &str = "settings.toml";

pub fn load_or_create_config() -> SieveResult<Config> {
    if Path::new(SETTINGS_FILE).exists() {
        let mut file = File::open(SETTINGS_FILE)
            .map_err(|e| SieveError::InvalidConfig(format!("failed to open {SETTINGS_FILE}: {e}")))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| SieveError::InvalidConfig(format!("failed to read {SETTINGS_FILE}: {e}")))?;
        let cfg: Config = toml::from_str(&contents)
            .map_err(|e| SieveError::InvalidConfig(format!("failed to parse {SETTINGS_FILE}: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    } else {
        let cfg = Config::default();
        save_config(&cfg)?;
        Ok(cfg)
    }
}

pub fn save_config(cfg: &Config) -> SieveResult<()> {
    let toml_str = toml::to_string_pretty(cfg)
        .map_err(|e| SieveError::InvalidConfig(format!("failed to serialize config: {e}")))?;
    let file = File::create(SETTINGS_FILE)
        .map_err(|e| SieveError::InvalidConfig(format!("failed to create {SETTINGS_FILE}: {e}")))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(toml_str.as_bytes())
        .map_err(|e| SieveError::InvalidConfig(format!("failed to write {SETTINGS_FILE}: {e}")))?;
    Ok(())
}
