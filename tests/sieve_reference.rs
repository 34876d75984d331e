use sosu_seisei_engine::config::Config;
use sosu_seisei_engine::engine::{count_primes, nth_prime, sieve_range};
use sosu_seisei_engine::verify::verify_ordered_primes;

/// 単純な試し割りによる素数列挙（テスト専用）。
fn trial_division_primes(start: u64, stop: u64) -> Vec<u64> {
    let mut primes = Vec::new();
    for n in start.max(2)..=stop {
        let mut is_prime = true;
        let mut d = 2u64;
        while d * d <= n {
            if n % d == 0 {
                is_prime = false;
                break;
            }
            d += 1;
        }
        if is_prime {
            primes.push(n);
        }
    }
    primes
}

/// 小さい範囲で試し割りの結果と完全一致することを確認する。
#[test]
fn matches_trial_division_on_small_ranges() {
    let cfg = Config::default();
    let ranges: &[(u64, u64)] = &[
        (0, 100),
        (1, 30),
        (29, 31),
        (990, 1_100),
        (7_900, 8_000),
        (65_000, 66_000),
    ];
    for &(start, stop) in ranges {
        let expected = trial_division_primes(start, stop);
        let actual = sieve_range(start, stop, &cfg).expect("sieve_range failed");
        assert_eq!(actual, expected, "range [{start}, {stop}]");
    }
}

/// 境界ケース。
#[test]
fn boundary_cases() {
    let cfg = Config::default();
    assert_eq!(sieve_range(0, 1, &cfg).unwrap(), Vec::<u64>::new());
    assert_eq!(sieve_range(2, 2, &cfg).unwrap(), vec![2]);
    assert_eq!(sieve_range(0, 10, &cfg).unwrap(), vec![2, 3, 5, 7]);
    assert_eq!(sieve_range(3, 3, &cfg).unwrap(), vec![3]);
    assert_eq!(sieve_range(24, 28, &cfg).unwrap(), Vec::<u64>::new());
    assert_eq!(sieve_range(0, 0, &cfg).unwrap(), Vec::<u64>::new());
}

/// 個数計算はストリーミング結果の長さと常に一致する。
#[test]
fn count_matches_streamed_length() {
    let cfg = Config::default();
    let ranges: &[(u64, u64)] = &[(0, 0), (0, 100), (100, 10_000), (999_000, 1_001_000)];
    for &(start, stop) in ranges {
        let primes = sieve_range(start, stop, &cfg).unwrap();
        let count = count_primes(start, stop, &cfg).unwrap();
        assert_eq!(count, primes.len() as u64, "range [{start}, {stop}]");
    }
}

/// 既知の π(x) の値と一致することを確認する。
///
/// 出典: 標準的な素数表 / OEIS A006880 など
#[test]
fn count_matches_known_pi_values() {
    let cfg = Config::default();
    let cases: &[(u64, u64)] = &[
        (10, 4),
        (100, 25),
        (1_000, 168),
        (10_000, 1_229),
        (100_000, 9_592),
        (1_000_000, 78_498),
        (10_000_000, 664_579),
    ];
    for &(x, expected) in cases {
        let count = count_primes(0, x, &cfg).unwrap();
        assert_eq!(count, expected, "pi({x}) should be {expected}, got {count}");
    }
}

/// n 番目の素数の既知の値。
#[test]
fn nth_prime_known_values() {
    let cfg = Config::default();
    let cases: &[(u64, u64)] = &[
        (1, 2),
        (2, 3),
        (6, 13),
        (25, 97),
        (100, 541),
        (1_000, 7_919),
        (10_000, 104_729),
    ];
    for &(n, expected) in cases {
        let p = nth_prime(n, &cfg).unwrap();
        assert_eq!(p, expected, "p_{n} should be {expected}, got {p}");
    }
}

/// 大きいオフセットの範囲でも Miller-Rabin の判定と一致する。
#[test]
fn large_offset_range_agrees_with_miller_rabin() {
    let cfg = Config::default();
    let start = 1_000_000_000_000u64;
    let stop = start + 10_000;
    let primes = sieve_range(start, stop, &cfg).unwrap();

    // 全件の単調性と末尾サンプルの素数性
    let report = verify_ordered_primes(&primes, primes.len()).unwrap();
    assert_eq!(report.count, primes.len() as u64);
    assert!(report.min >= start && report.max <= stop);

    // 逆方向: 範囲内で素数判定される値はすべて列に含まれる
    let mut expected = 0u64;
    for n in start..=stop {
        if sosu_seisei_engine::verify::is_probable_prime(n) {
            expected += 1;
            assert!(primes.binary_search(&n).is_ok(), "{n} missing from output");
        }
    }
    assert_eq!(primes.len() as u64, expected);
}

/// 範囲・設定の検証が篩い開始前に行われることを確認する。
#[test]
fn eager_validation_of_range_and_config() {
    let cfg = Config::default();
    assert!(sieve_range(10, 9, &cfg).is_err());

    let mut bad = Config::default();
    bad.pre_sieve_limit = 29;
    assert!(count_primes(0, 10, &bad).is_err());

    let mut bad = Config::default();
    bad.segment_size_kb = 3_000;
    assert!(sieve_range(0, 10, &bad).is_err());
}
