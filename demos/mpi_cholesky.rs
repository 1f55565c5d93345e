//? mpirun -n {{NPROCESSES}} --features "mpi"

#[cfg(feature = "mpi")]
use distmat::{
    cholesky::{lvar3_pivoted, CholeskyOptions},
    comm::MpiComm,
    matrices::{fill_with, uniform},
    redist::redistribute,
    DistMatrix, Distribution, Grid,
};
#[cfg(feature = "mpi")]
use mpi::{environment::Universe, traits::Communicator};
#[cfg(feature = "mpi")]
use rand::{rngs::StdRng, SeedableRng};

#[cfg(feature = "mpi")]
fn main() {
    let universe: Universe = mpi::initialize().unwrap();
    let world = universe.world();
    let rank = world.rank() as usize;
    let grid = Grid::square(MpiComm::new(world)).unwrap();
    let n = 200;

    // A = B B^T + n I is symmetric positive definite.
    let mut rng = StdRng::seed_from_u64(rank as u64);
    let mut b = DistMatrix::<f64, _>::new(&grid, Distribution::MC_MR);
    uniform(&mut b, n, n, 0.0, 1.0, &mut rng).unwrap();
    let b = redistribute(&b, Distribution::STAR_STAR).unwrap();
    let b = b.locked_matrix();
    let mut a = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, n, n);
    fill_with(&mut a, |i, j| {
        let product: f64 = (0..n).map(|k| b.get(i, k) * b.get(j, k)).sum();
        if i == j {
            product + n as f64
        } else {
            product
        }
    })
    .unwrap();

    let original = redistribute(&a, Distribution::STAR_STAR).unwrap();
    let original = original.locked_matrix();

    let mut p = DistMatrix::new(&grid, Distribution::STAR_STAR);
    let mut options = CholeskyOptions::default();
    options.set_block_size(32);
    lvar3_pivoted(&mut a, &mut p, &options).unwrap();

    // Largest entry of L L^T - P A P^T relative to the largest entry of A
    let l = redistribute(&a, Distribution::STAR_STAR).unwrap();
    let l = l.locked_matrix();
    let p = p.locked_matrix().to_column_major();
    let mut residual = 0.0f64;
    let mut scale = 0.0f64;
    for j in 0..n {
        for i in j..n {
            let product: f64 = (0..=j).map(|k| l.get(i, k) * l.get(j, k)).sum();
            let entry = original.get(p[i], p[j]);
            residual = residual.max((product - entry).abs());
            scale = scale.max(entry.abs());
        }
    }
    let relative = residual / scale;
    assert!(relative < 1e-10, "relative residual {relative:e} is too large");

    if rank == 0 {
        println!(
            "Factored a {n} x {n} matrix on a {} x {} grid; first pivot {}, relative residual {relative:e}",
            grid.height(),
            grid.width(),
            p[0]
        );
    }
}

#[cfg(not(feature = "mpi"))]
fn main() {}
