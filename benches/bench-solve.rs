//! Benchmarks for core BDD operations (spec.md §8's N-queens-style
//! workload), using `divan` the way the teacher's own `Cargo.toml` already
//! declares it as a dev-dependency.
use divan::Bencher;
use sylvan::bdd::BddBase;
use sylvan::nid::{self, Nid};

fn main() {
    divan::main();
}

fn queens_sat(b: &BddBase, n: usize) -> Nid {
    let vars: Vec<Vec<Nid>> = (0..n).map(|_| (0..n).map(|_| b.new_var()).collect()).collect();
    let mut f = nid::I;
    for row in &vars {
        let mut at_least_one = nid::O;
        for &v in row { at_least_one = b.or(at_least_one, v); }
        f = b.and(f, at_least_one);
        for c1 in 0..n {
            for c2 in (c1 + 1)..n {
                let clash = b.and(row[c1], row[c2]);
                f = b.and(f, b.not(clash));
            }
        }
    }
    #[allow(clippy::needless_range_loop)]
    for c in 0..n {
        for r1 in 0..n {
            for r2 in (r1 + 1)..n {
                let clash = b.and(vars[r1][c], vars[r2][c]);
                f = b.and(f, b.not(clash));
            }
        }
    }
    f
}

#[divan::bench(args = [4, 5, 6])]
fn queens_construct(bencher: Bencher, n: usize) {
    bencher.bench(|| {
        let b = BddBase::new(1);
        queens_sat(&b, n)
    });
}

#[divan::bench]
fn and_chain_16vars(bencher: Bencher) {
    bencher.bench(|| {
        let b = BddBase::new(num_cpus::get());
        let mut f = nid::I;
        for _ in 0..16 {
            let v = b.new_var();
            f = b.and(f, v);
        }
        f
    });
}

#[divan::bench]
fn satcount_20vars(bencher: Bencher) {
    let b = BddBase::new(1);
    let mut f = nid::I;
    for _ in 0..20 {
        let v = b.new_var();
        f = b.and(f, v);
    }
    bencher.bench(|| b.satcount(f, 20));
}
