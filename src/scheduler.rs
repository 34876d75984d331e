//! サブ区間のスケジューリングと順序付きマージ。
//!
//! 大きな範囲をガイド付き（徐々に短くなる）方針でサブ区間に切り出し、
//! スレッド数ぶんずつまとめて並列に篩う。サブ区間同士は共有する可変状態を
//! 持たず、完了順がどうであれ結果は開始位置の昇順でマージされる。
//! これにより出力列は常に決定的になる。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::{MAX_THREAD_INTERVAL, MIN_THREAD_INTERVAL, THREAD_SPREAD_FACTOR};
use crate::engine_types::{compute_eta, Progress, SieveResult};

/// 1 スレッドに割り当てる独立なサブ区間（両端含む）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subinterval {
    pub low: u64,
    pub high: u64,
}

/// 次のサブ区間の長さを決める。
///
/// 残り範囲 / (分配係数 * スレッド数) を [MIN, MAX] にクランプする。
/// 割り当てのたびに残り範囲から再計算されるため、終盤ほど区間は短くなり、
/// 最後のスレッドだけが突出して長い区間を抱えることがない。
pub fn next_interval_len(remaining: u64, threads: usize) -> u64 {
    let target = remaining / (THREAD_SPREAD_FACTOR * threads.max(1) as u64);
    target
        .clamp(MIN_THREAD_INTERVAL, MAX_THREAD_INTERVAL)
        .min(remaining)
        .max(1)
}

/// `[start, stop]` をサブ区間に分割し、グループ単位で並列に `worker` を適用して
/// 結果を開始位置順に `merge` へ渡す。
///
/// - `worker` は各サブ区間を独立に処理する（スレッド間で呼ばれる）。
/// - `merge` は呼び出し側スレッドで、サブ区間の開始位置の昇順に呼ばれる。
/// - あるサブ区間の worker がエラーを返した場合、それより前のサブ区間の
///   結果はマージ済みのまま、エラーを即座に返す（部分的な結果は有効）。
/// - 進捗はグループ処理のたびに `progress_cb` へ報告される。
pub fn run_ordered<T, W, M>(
    start: u64,
    stop: u64,
    threads: usize,
    pool: Option<&rayon::ThreadPool>,
    stop_flag: &AtomicBool,
    worker: W,
    mut merge: M,
    mut progress_cb: impl FnMut(Progress),
) -> SieveResult<()>
where
    T: Send,
    W: Fn(&Subinterval) -> SieveResult<T> + Sync,
    M: FnMut(&Subinterval, T) -> SieveResult<()>,
{
    let start_time = Instant::now();
    let total = stop - start + 1;
    let group_size = threads.max(1);

    let mut next = start;
    let mut processed = 0u64;
    let mut group_index = 0usize;

    while next <= stop {
        if stop_flag.load(Ordering::SeqCst) {
            return Ok(());
        }

        group_index += 1;

        // このグループで処理するサブ区間を生成（保持するのはこのグループ分だけ）
        let mut group: Vec<Subinterval> = Vec::with_capacity(group_size);
        for _ in 0..group_size {
            if next > stop {
                break;
            }
            let remaining = stop - next + 1;
            let len = next_interval_len(remaining, threads);
            let high = next.saturating_add(len - 1).min(stop);
            group.push(Subinterval { low: next, high });
            next = high + 1;
        }

        if group.is_empty() {
            break;
        }

        log::debug!(
            "sieving group {} ({} subintervals, [{}, {}])",
            group_index,
            group.len(),
            group[0].low,
            group[group.len() - 1].high
        );

        // グループ内を並列処理
        let run = || {
            group
                .par_iter()
                .map(|iv| (*iv, worker(iv)))
                .collect::<Vec<_>>()
        };
        let mut results = match pool {
            Some(p) => p.install(run),
            None => run(),
        };

        // サブ区間の開始位置でソートして出力順を保証
        results.sort_by_key(|(iv, _)| iv.low);

        for (iv, res) in results {
            let value = res?;
            merge(&iv, value)?;
            processed = processed.saturating_add(iv.high - iv.low + 1);
        }

        let elapsed = start_time.elapsed().as_secs_f64();
        progress_cb(Progress {
            processed: processed.min(total),
            total,
            eta_secs: compute_eta(processed.min(total), total, elapsed),
        });
    }

    Ok(())
}
