use criterion::{black_box, criterion_group, criterion_main, Criterion};
use distmat::cholesky::{lvar3_pivoted, sequential, CholeskyOptions};
use distmat::matrices::fill_with;
use distmat::{DistMatrix, Distribution, Grid, LocalMatrix, ThreadUniverse};

fn entry(n: usize, i: usize, j: usize) -> f64 {
    if i == j {
        (2 * n + i) as f64
    } else {
        1.0 / (1 + i + j) as f64
    }
}

pub fn cholesky_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cholesky");
    group.sample_size(10);

    for n in [64, 128] {
        for block_size in [16, 64] {
            let mut options = CholeskyOptions::default();
            options.set_block_size(block_size);

            group.bench_function(
                format!("Sequential pivoted Cholesky of {n}x{n} matrix, block size {block_size}"),
                |b| {
                    b.iter(|| {
                        let data = (0..n * n).map(|k| entry(n, k % n, k / n)).collect();
                        let mut a = LocalMatrix::from_column_major(n, n, data);
                        let mut p = vec![0; n];
                        sequential::lvar3_pivoted(&mut a, &mut p, &options).unwrap();
                        black_box(a.get(n - 1, n - 1))
                    })
                },
            );

            group.bench_function(
                format!("Pivoted Cholesky of {n}x{n} matrix on a 2x2 grid, block size {block_size}"),
                |b| {
                    b.iter(|| {
                        ThreadUniverse::run(4, |comm| {
                            let grid = Grid::new(comm, 2).unwrap();
                            let mut a = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, n, n);
                            fill_with(&mut a, |i, j| entry(n, i, j)).unwrap();
                            let mut p = DistMatrix::new(&grid, Distribution::VC_STAR);
                            lvar3_pivoted(&mut a, &mut p, &options).unwrap();
                            black_box(a.local_height())
                        })
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, cholesky_benchmark);
criterion_main!(benches);
