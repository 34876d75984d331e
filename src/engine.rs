//! 素数エンジンの公開 API。
//!
//! - `generate_primes`: 範囲内の素数を昇順で Sink へ流す（ストリーミング）。
//! - `sieve_range`: 範囲内の素数をベクタで返す簡易版。
//! - `count_primes`: 個数だけを数える。セグメントの復号をせず popcount で済ます。
//! - `nth_prime`: n 番目の素数。探索範囲を推定し、足りなければ倍にして再試行。
//!
//! どの API も呼び出しごとにゼロから篩い直す。設定と範囲は篩い開始前に
//! 検証され、違反は即座にエラーで返る。

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::{Config, MAX_STOP, PRESIEVE_MIN_PRIME, PRESIEVE_THRESHOLD};
use crate::engine_types::{Progress, SieveError, SieveResult};
use crate::memory;
use crate::pre_sieve::PreSieve;
use crate::prime_generator::generate_sieving_primes;
use crate::scheduler::{self, Subinterval};
use crate::segment_sieve::SegmentSieve;
use crate::sieve_math::integer_sqrt;
use crate::sink::{CollectSink, NthPrimeSink, PrimeSink};
use crate::wheel;

/// 1 回の呼び出しで全ワーカーが共有する実行時パラメータ。
/// プリシーブパターンは構築後不変で、Arc 経由の読み取り専用共有になる。
struct SieveRuntime {
    segment_bytes: usize,
    pre_sieve: Arc<PreSieve>,
}

fn validate_range(start: u64, stop: u64) -> SieveResult<()> {
    if stop < start {
        return Err(SieveError::InvalidRange(format!(
            "stop ({stop}) must be >= start ({start})"
        )));
    }
    if stop > MAX_STOP {
        return Err(SieveError::InvalidRange(format!(
            "stop ({stop}) exceeds the supported maximum ({MAX_STOP})"
        )));
    }
    Ok(())
}

/// 検証済みの設定から実行時パラメータを組み立てる。
fn prepare(start: u64, stop: u64, cfg: &Config, threads: usize) -> SieveResult<SieveRuntime> {
    let segment_kb = if cfg.segment_size_kb > 0 {
        cfg.segment_size_kb
    } else {
        memory::auto_segment_kb(cfg.memory_usage_percent, threads)
    };
    let segment_bytes = (segment_kb * 1024) as usize;

    // プリシーブのフルパターンは構築コストが高く、大きな区間でしか元が
    // 取れない。小さい区間では最小の素数 7 だけをパターン化し、残りは
    // 篩い素数として普通に消し込む。
    let interval = stop - start;
    let limit = if interval >= PRESIEVE_THRESHOLD {
        cfg.pre_sieve_limit
    } else {
        PRESIEVE_MIN_PRIME
    };
    let pre_sieve = Arc::new(PreSieve::new(limit)?);

    log::info!(
        "sieving [{start}, {stop}]: segment {segment_kb} KB, pre-sieve <= {}, {threads} thread(s)",
        pre_sieve.max_prime()
    );
    log::info!("{}", memory::memory_info(segment_bytes, threads).format());

    Ok(SieveRuntime {
        segment_bytes,
        pre_sieve,
    })
}

fn build_pool(cfg: &Config) -> SieveResult<Option<rayon::ThreadPool>> {
    if cfg.thread_count == 0 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.thread_count)
        .build()
        .map(Some)
        .map_err(|e| SieveError::InvalidConfig(format!("failed to build thread pool: {e}")))
}

/// サブ区間 1 つを独立に篩う。ブートストラップで篩い素数を登録し、
/// 完了したセグメントを順に `consume` へ渡す。
fn sieve_subinterval(
    iv: &Subinterval,
    rt: &SieveRuntime,
    stop_flag: &AtomicBool,
    consume: &mut impl FnMut(&[u8], u64) -> SieveResult<()>,
) -> SieveResult<()> {
    let mut sieve = SegmentSieve::new(
        iv.low,
        iv.high,
        rt.segment_bytes,
        Arc::clone(&rt.pre_sieve),
        None,
    )?;

    let root = integer_sqrt(iv.high);
    if root > rt.pre_sieve.max_prime() {
        generate_sieving_primes(rt.pre_sieve.max_prime(), root, stop_flag, &mut |p| {
            sieve.add_sieving_prime(p)
        })?;
    }

    sieve.run(stop_flag, consume)
}

/// サブ区間に含まれる、ホイール・プリシーブで処理済みの小素数。
/// ビット配列には現れないため別枠で先頭に出力する。
fn base_primes_in(iv: &Subinterval, max_prime: u64) -> impl Iterator<Item = u64> + '_ {
    wheel::BASE_PRIMES
        .iter()
        .copied()
        .filter(move |&p| p <= max_prime && p >= iv.low && p <= iv.high)
}

/// `[start, stop]` の素数を昇順で `sink` へ流す。
///
/// 進捗はサブ区間グループの完了ごとに `progress_cb` へ報告される。
/// `stop_flag` はセグメント粒度で確認され、立てられた時点までに出力済みの
/// 素数はそのまま有効。
pub fn generate_primes(
    start: u64,
    stop: u64,
    cfg: &Config,
    stop_flag: &AtomicBool,
    sink: &mut dyn PrimeSink,
    progress_cb: impl FnMut(Progress),
) -> SieveResult<()> {
    cfg.validate()?;
    validate_range(start, stop)?;

    let pool = build_pool(cfg)?;
    let threads = pool
        .as_ref()
        .map_or_else(rayon::current_num_threads, |p| p.current_num_threads());
    let rt = prepare(start, stop, cfg, threads)?;

    scheduler::run_ordered(
        start,
        stop,
        threads,
        pool.as_ref(),
        stop_flag,
        |iv| {
            let mut primes: Vec<u64> = base_primes_in(iv, rt.pre_sieve.max_prime()).collect();
            sieve_subinterval(iv, &rt, stop_flag, &mut |bytes, low| {
                wheel::decode_segment(bytes, low, &mut |n| primes.push(n));
                Ok(())
            })?;
            Ok(primes)
        },
        |_, primes| {
            for p in primes {
                sink.prime(p)?;
            }
            Ok(())
        },
        progress_cb,
    )?;

    sink.finish()
}

/// `[start, stop]` の素数を昇順のベクタで返す簡易 API。
pub fn sieve_range(start: u64, stop: u64, cfg: &Config) -> SieveResult<Vec<u64>> {
    let stop_flag = AtomicBool::new(false);
    let mut sink = CollectSink::new();
    generate_primes(start, stop, cfg, &stop_flag, &mut sink, |_| {})?;
    Ok(sink.into_primes())
}

/// `[start, stop]` の素数の個数を返す。
///
/// ストリーミングと違い、セグメントの立っているビットを popcount するだけで
/// 値の復元をしない。マスク処理は復号前に済んでいるため両者は常に一致する。
pub fn count_primes(start: u64, stop: u64, cfg: &Config) -> SieveResult<u64> {
    cfg.validate()?;
    validate_range(start, stop)?;

    let stop_flag = AtomicBool::new(false);
    let pool = build_pool(cfg)?;
    let threads = pool
        .as_ref()
        .map_or_else(rayon::current_num_threads, |p| p.current_num_threads());
    let rt = prepare(start, stop, cfg, threads)?;

    let mut total = 0u64;
    scheduler::run_ordered(
        start,
        stop,
        threads,
        pool.as_ref(),
        &stop_flag,
        |iv| {
            let mut count = base_primes_in(iv, rt.pre_sieve.max_prime()).count() as u64;
            sieve_subinterval(iv, &rt, &stop_flag, &mut |bytes, _| {
                count += bytes.iter().map(|&b| b.count_ones() as u64).sum::<u64>();
                Ok(())
            })?;
            Ok(count)
        },
        |_, count| {
            total += count;
            Ok(())
        },
        |_| {},
    )?;

    Ok(total)
}

/// n 番目の素数（1 始まり）を返す。`nth_prime(1) = 2`。
///
/// 探索上限は p_n < n (ln n + ln ln n) の評価（n >= 6 で成立）から推定し、
/// 発見と同時に停止フラグで残りの篩いを打ち切る。推定が外れた場合は
/// 上限を倍にしてゼロから篩い直す。
pub fn nth_prime(n: u64, cfg: &Config) -> SieveResult<u64> {
    if n == 0 {
        return Err(SieveError::InvalidRange(
            "n must be >= 1 for nth_prime".into(),
        ));
    }

    let mut bound = nth_prime_upper_bound(n);
    loop {
        let stop_flag = AtomicBool::new(false);
        let mut sink = NthPrimeSink::new(n, &stop_flag);
        generate_primes(0, bound, cfg, &stop_flag, &mut sink, |_| {})?;
        if let Some(p) = sink.found() {
            return Ok(p);
        }
        if bound >= MAX_STOP {
            return Err(SieveError::InvalidRange(format!(
                "nth_prime({n}) exceeds the supported domain"
            )));
        }
        log::debug!("nth_prime({n}): bound {bound} too small, doubling");
        bound = bound.saturating_mul(2).min(MAX_STOP);
    }
}

fn nth_prime_upper_bound(n: u64) -> u64 {
    if n < 6 {
        return 13;
    }
    let nf = n as f64;
    let ln = nf.ln();
    (nf * (ln + ln.ln())).ceil() as u64
}
