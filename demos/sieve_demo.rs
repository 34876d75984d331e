/// 篩エンジンの動作確認デモ（CLI専用）
///
/// 使い方:
/// ```bash
/// cargo run --example sieve_demo --release
/// ```
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use sosu_seisei_engine::config::{load_or_create_config, Config};
use sosu_seisei_engine::engine::{count_primes, generate_primes, nth_prime};
use sosu_seisei_engine::sink::CollectSink;
use sosu_seisei_engine::verify::verify_ordered_primes;

fn main() {
    env_logger::init();

    // settings.toml があれば読み込み、なければ既定値で作成する
    let cfg = match load_or_create_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("設定の読み込みに失敗したため既定値を使います: {e}");
            Config::default()
        }
    };

    println!("========================================");
    println!("分割ホイール篩エンジン デモ");
    println!("========================================");

    // 1. 小さい範囲のストリーミング
    println!("\n--- [0, 100] の素数 ---");
    let stop_flag = AtomicBool::new(false);
    let mut sink = CollectSink::new();
    match generate_primes(0, 100, &cfg, &stop_flag, &mut sink, |_| {}) {
        Ok(()) => {
            let primes = sink.into_primes();
            println!("{} 個: {:?}", primes.len(), primes);
        }
        Err(e) => {
            eprintln!("エラー: {e}");
            return;
        }
    }

    // 2. 個数計算
    println!("\n--- π(x) の計算 ---");
    for x in [1_000_000u64, 10_000_000, 100_000_000] {
        let start = Instant::now();
        match count_primes(0, x, &cfg) {
            Ok(count) => {
                println!("pi({x}) = {count}  (elapsed: {:.3?})", start.elapsed());
            }
            Err(e) => eprintln!("Error while counting primes below {x}: {e}"),
        }
    }

    // 3. n 番目の素数
    println!("\n--- n 番目の素数 ---");
    for n in [1u64, 6, 1_000, 1_000_000] {
        match nth_prime(n, &cfg) {
            Ok(p) => println!("p_{n} = {p}"),
            Err(e) => eprintln!("Error while computing nth prime {n}: {e}"),
        }
    }

    // 4. オフセット範囲の生成と検証
    println!("\n--- [10^12, 10^12 + 10^5] の素数を生成して検証 ---");
    let start = 1_000_000_000_000u64;
    let stop = start + 100_000;
    let stop_flag = AtomicBool::new(false);
    let mut sink = CollectSink::new();
    match generate_primes(start, stop, &cfg, &stop_flag, &mut sink, |_| {}) {
        Ok(()) => {
            let primes = sink.into_primes();
            match verify_ordered_primes(&primes, 100) {
                Ok(report) => {
                    println!(
                        "✓ {} 個生成 (min={}, max={}, 末尾 {} 件を Miller-Rabin で確認)",
                        report.count, report.min, report.max, report.checked_tail
                    );
                }
                Err(e) => println!("✗ 検証エラー: {e}"),
            }
        }
        Err(e) => eprintln!("エラー: {e}"),
    }

    println!("\n========================================");
    println!("デモ完了");
    println!("========================================");
}
