use sysinfo::System;

use crate::config::{
    BYTES_PER_ALLOC, DEFAULT_SEGMENT_KB, MAX_SEGMENT_KB, MIN_SEGMENT_KB,
};

/// システムの物理メモリ総量を取得（バイト単位）
pub fn get_total_memory() -> u64 {
    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.total_memory()
}

/// メモリ制限に基づいてセグメントサイズ（KB）を自動決定する。
///
/// セグメントは CPU キャッシュに収まるのが理想なので、既定値を上限として、
/// 許容メモリに収まらない場合だけ切り下げる。結果は文書化された境界
/// [MIN_SEGMENT_KB, MAX_SEGMENT_KB] にクランプされる。
/// memory_usage_percent: システムメモリの何%まで使用するか (10.0 ~ 90.0)
/// num_threads: 並列スレッド数
pub fn auto_segment_kb(memory_usage_percent: f64, num_threads: usize) -> u64 {
    let total_memory = get_total_memory();

    // メモリ使用率を 10.0 ~ 90.0 の範囲にクランプ
    let percent = memory_usage_percent.clamp(10.0, 90.0);

    // 許容メモリ量
    let allowed_memory = (total_memory as f64 * percent / 100.0) as u64;

    // 安全係数 (他のプロセスやシステムのために余裕を持たせる)
    let safety_factor = 2.0;

    // スレッドあたりの許容メモリ
    let per_thread_memory = allowed_memory / (num_threads as u64).max(1);
    let safe_memory = (per_thread_memory as f64 / safety_factor) as u64;

    let kb = (safe_memory / 1024).min(DEFAULT_SEGMENT_KB);
    kb.clamp(MIN_SEGMENT_KB, MAX_SEGMENT_KB)
}

/// メモリ使用量の情報を表示用に取得
///
/// セグメントバッファに加えて Big 階層のバケットチャンク 1 つ分を
/// スレッドあたりの使用量として見積もる。
pub fn memory_info(segment_bytes: usize, num_threads: usize) -> MemoryInfo {
    let total_memory = get_total_memory();
    let per_thread = segment_bytes as u64 + BYTES_PER_ALLOC as u64;
    let estimated_total = per_thread * num_threads as u64;
    let usage_percent = if total_memory > 0 {
        (estimated_total as f64 / total_memory as f64) * 100.0
    } else {
        0.0
    };

    MemoryInfo {
        total_memory,
        per_thread,
        estimated_total,
        usage_percent,
    }
}

#[derive(Debug, Clone)]
pub struct MemoryInfo {
    pub total_memory: u64,
    pub per_thread: u64,
    pub estimated_total: u64,
    pub usage_percent: f64,
}

impl MemoryInfo {
    pub fn format(&self) -> String {
        format!(
            "メモリ: システム {:.1}GB, スレッドあたり {:.1}MB, 推定使用量 {:.1}MB ({:.2}%)",
            self.total_memory as f64 / (1024.0 * 1024.0 * 1024.0),
            self.per_thread as f64 / (1024.0 * 1024.0),
            self.estimated_total as f64 / (1024.0 * 1024.0),
            self.usage_percent
        )
    }
}
