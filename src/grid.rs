//! Process grid
//!
//! The first `depth * height * width` processes of a communicator form the grid. Each
//! depth slice is a `height x width` mesh numbered column-major (VC) and row-major (VR);
//! only slice 0 holds matrix data. The diagonals of the mesh wrap around: path `k`
//! visits the processes `(i mod height, (i + k) mod width)` for `i` in `[0, lcm)`.
use crate::comm::Comm;
use crate::dist::Dist;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_GRID_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identity of a grid.
///
/// Two matrices are on the same grid iff their grid ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridId(usize);

impl GridId {
    fn next() -> Self {
        GridId(NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Derived communicators of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommKind {
    /// Only the calling process
    SelfComm,
    /// The processes of the caller's grid column
    Mc,
    /// The processes of the caller's grid row
    Mr,
    /// The whole slice, column-major
    Vc,
    /// The whole slice, row-major
    Vr,
    /// The processes of the caller's diagonal path
    Md,
    /// One process per diagonal path, at the caller's position along the path
    MdPerp,
    /// The processes at the caller's mesh position in every depth slice
    Depth,
}

impl CommKind {
    /// Communicator a tag distributes over
    pub fn of(dist: Dist) -> CommKind {
        match dist {
            Dist::Circ | Dist::Star => CommKind::SelfComm,
            Dist::Mc => CommKind::Mc,
            Dist::Mr => CommKind::Mr,
            Dist::Md => CommKind::Md,
            Dist::Vc => CommKind::Vc,
            Dist::Vr => CommKind::Vr,
        }
    }
}

/// Position of a process within a depth slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coords {
    /// Column-major rank
    pub vc: usize,
    /// Row-major rank
    pub vr: usize,
    /// Row of the mesh
    pub mc: usize,
    /// Column of the mesh
    pub mr: usize,
    /// Position along the diagonal path
    pub md: usize,
    /// Diagonal path
    pub path: usize,
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// A logical mesh of processes with its derived communicators.
pub struct Grid<C: Comm> {
    id: GridId,
    height: usize,
    width: usize,
    depth: usize,
    gcd: usize,
    lcm: usize,
    in_grid: bool,
    slice: usize,
    coords: Coords,
    viewing: C,
    self_comm: C,
    mc: C,
    mr: C,
    vc: C,
    vr: C,
    md: C,
    md_perp: C,
    depth_comm: C,
}

impl<C: Comm> Grid<C> {
    /// Grid of the given height using every process of `comm`.
    pub fn new(comm: C, height: usize) -> Result<Self> {
        let size = comm.size();
        if height == 0 || size % height != 0 {
            return Err(Error::InvalidGrid(format!(
                "height {height} does not divide the {size} processes"
            ))
            .report());
        }
        let width = size / height;
        Self::with_shape(comm, height, width, 1)
    }

    /// The most square grid using every process of `comm`.
    pub fn square(comm: C) -> Result<Self> {
        let size = comm.size();
        let mut height = (size as f64).sqrt() as usize;
        while height > 1 && size % height != 0 {
            height -= 1;
        }
        Self::new(comm, height.max(1))
    }

    /// Grid of `depth` slices of `height x width` processes.
    ///
    /// Processes beyond the grid take part in construction but in no derived communicator.
    pub fn with_shape(comm: C, height: usize, width: usize, depth: usize) -> Result<Self> {
        let size = comm.size();
        if height == 0 || width == 0 || depth == 0 {
            return Err(Error::InvalidGrid(format!(
                "grid dimensions {height} x {width} x {depth} must be positive"
            ))
            .report());
        }
        let grid_size = height * width * depth;
        if grid_size > size {
            return Err(Error::InvalidGrid(format!(
                "{height} x {width} x {depth} grid needs more than {size} processes"
            ))
            .report());
        }

        let gcd = gcd(height, width);
        let lcm = height * width / gcd;
        let rank = comm.rank();
        let in_grid = rank < grid_size;
        let slice = rank / (height * width);
        let coords = if in_grid {
            Self::coords_in(rank % (height * width), height, width, gcd, lcm)
        } else {
            Coords::default()
        };

        // Processes outside the grid get colors that no member uses.
        let color = |c: usize| if in_grid { c } else { grid_size + rank };
        let vc = comm.split(color(slice), coords.vc);
        let vr = comm.split(color(slice), coords.vr);
        let mc = comm.split(color(slice * width + coords.mr), coords.mc);
        let mr = comm.split(color(slice * height + coords.mc), coords.mr);
        let md = comm.split(color(slice * gcd + coords.path), coords.md);
        let md_perp = comm.split(color(slice * lcm + coords.md), coords.path);
        let depth_comm = comm.split(color(coords.vc), slice);
        let self_comm = comm.split(rank, 0);

        log::debug!(
            "Created {height} x {width} x {depth} grid; rank {rank} at {coords:?} in slice {slice}"
        );
        Ok(Self {
            id: GridId::next(),
            height,
            width,
            depth,
            gcd,
            lcm,
            in_grid,
            slice,
            coords,
            viewing: comm,
            self_comm,
            mc,
            mr,
            vc,
            vr,
            md,
            md_perp,
            depth_comm,
        })
    }

    fn coords_in(vc: usize, height: usize, width: usize, gcd: usize, lcm: usize) -> Coords {
        let mc = vc % height;
        let mr = vc / height;
        let (md, path) = (0..lcm)
            .filter(|i| i % height == mc)
            .map(|i| (i, (mr + width - i % width) % width))
            .find(|&(_, k)| k < gcd)
            .unwrap_or((0, 0));
        Coords {
            vc,
            vr: mc * width + mr,
            mc,
            mr,
            md,
            path,
        }
    }

    /// Identity of the grid
    pub fn id(&self) -> GridId {
        self.id
    }
    /// Number of rows of the mesh
    pub fn height(&self) -> usize {
        self.height
    }
    /// Number of columns of the mesh
    pub fn width(&self) -> usize {
        self.width
    }
    /// Number of depth slices
    pub fn depth(&self) -> usize {
        self.depth
    }
    /// Number of processes of one slice
    pub fn size(&self) -> usize {
        self.height * self.width
    }
    /// Greatest common divisor of height and width, the number of diagonal paths
    pub fn gcd(&self) -> usize {
        self.gcd
    }
    /// Least common multiple of height and width, the length of a diagonal path
    pub fn lcm(&self) -> usize {
        self.lcm
    }

    /// Is the caller one of the grid's processes?
    pub fn in_grid(&self) -> bool {
        self.in_grid
    }

    /// Does the caller hold matrix data, i.e. is it in slice 0 of the grid?
    pub fn participating(&self) -> bool {
        self.in_grid && self.slice == 0
    }

    /// Depth slice of the caller
    pub fn slice(&self) -> usize {
        self.slice
    }

    /// Coordinates of the caller
    pub fn local_coords(&self) -> Coords {
        self.coords
    }

    /// Coordinates of the process with column-major rank `vc`
    pub fn coords(&self, vc: usize) -> Coords {
        Self::coords_in(vc, self.height, self.width, self.gcd, self.lcm)
    }

    /// Column-major rank of the caller
    pub fn vc_rank(&self) -> usize {
        self.coords.vc
    }
    /// Row-major rank of the caller
    pub fn vr_rank(&self) -> usize {
        self.coords.vr
    }
    /// Row of the caller
    pub fn mc_rank(&self) -> usize {
        self.coords.mc
    }
    /// Column of the caller
    pub fn mr_rank(&self) -> usize {
        self.coords.mr
    }
    /// Position of the caller along its diagonal path
    pub fn md_rank(&self) -> usize {
        self.coords.md
    }
    /// Diagonal path of the caller
    pub fn md_path(&self) -> usize {
        self.coords.path
    }

    /// Column-major rank of mesh position `(mc, mr)`
    pub fn vc_of_mc_mr(&self, mc: usize, mr: usize) -> usize {
        mc + mr * self.height
    }

    /// Column-major rank of row-major rank `vr`
    pub fn vc_of_vr(&self, vr: usize) -> usize {
        self.vc_of_mc_mr(vr / self.width, vr % self.width)
    }

    /// Column-major rank of position `md` on diagonal path `path`
    pub fn vc_of_md(&self, path: usize, md: usize) -> usize {
        self.vc_of_mc_mr(md % self.height, (md + path) % self.width)
    }

    /// Rank of the process with coordinates `coords` in the communicator of `dist`
    pub fn dist_rank(&self, dist: Dist, coords: &Coords) -> usize {
        match dist {
            Dist::Circ | Dist::Star => 0,
            Dist::Mc => coords.mc,
            Dist::Mr => coords.mr,
            Dist::Md => coords.md,
            Dist::Vc => coords.vc,
            Dist::Vr => coords.vr,
        }
    }

    /// Number of processes a tag distributes over
    pub fn stride(&self, dist: Dist) -> usize {
        match dist {
            Dist::Circ | Dist::Star => 1,
            Dist::Mc => self.height,
            Dist::Mr => self.width,
            Dist::Md => self.lcm,
            Dist::Vc | Dist::Vr => self.height * self.width,
        }
    }

    /// A derived communicator
    pub fn comm(&self, kind: CommKind) -> &C {
        match kind {
            CommKind::SelfComm => &self.self_comm,
            CommKind::Mc => &self.mc,
            CommKind::Mr => &self.mr,
            CommKind::Vc => &self.vc,
            CommKind::Vr => &self.vr,
            CommKind::Md => &self.md,
            CommKind::MdPerp => &self.md_perp,
            CommKind::Depth => &self.depth_comm,
        }
    }

    /// The communicator the grid was built from
    pub fn viewing_comm(&self) -> &C {
        &self.viewing
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::ThreadUniverse;

    #[test]
    fn test_coordinates() {
        let results = ThreadUniverse::run(6, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            (
                grid.local_coords(),
                grid.comm(CommKind::Mc).size(),
                grid.comm(CommKind::Mr).size(),
                grid.comm(CommKind::Md).size(),
                grid.comm(CommKind::MdPerp).size(),
                grid.comm(CommKind::Vr).rank(),
                grid.comm(CommKind::Mc).rank(),
            )
        });
        let (coords, mc_size, mr_size, md_size, md_perp_size, vr, mc) = results[3];
        assert_eq!(
            coords,
            Coords {
                vc: 3,
                vr: 4,
                mc: 1,
                mr: 1,
                md: 1,
                path: 0
            }
        );
        assert_eq!((mc_size, mr_size, md_size, md_perp_size), (2, 3, 6, 1));
        assert_eq!((vr, mc), (4, 1));
    }

    #[test]
    fn test_diagonal_paths() {
        let results = ThreadUniverse::run(8, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let coords = grid.local_coords();
            assert_eq!(grid.vc_of_md(coords.path, coords.md), coords.vc);
            assert_eq!(grid.vc_of_vr(coords.vr), coords.vc);
            (
                coords.path,
                grid.comm(CommKind::Md).size(),
                grid.comm(CommKind::MdPerp).size(),
            )
        });
        // 2 x 4 mesh: two paths of length four
        for (path, md_size, md_perp_size) in results {
            assert!(path < 2);
            assert_eq!((md_size, md_perp_size), (4, 2));
        }
    }

    #[test]
    fn test_participation() {
        let results = ThreadUniverse::run(5, |comm| {
            let grid = Grid::with_shape(comm, 1, 2, 2).unwrap();
            (
                grid.in_grid(),
                grid.participating(),
                grid.comm(CommKind::Vc).size(),
                grid.comm(CommKind::Depth).size(),
                grid.comm(CommKind::Depth).rank(),
            )
        });
        assert_eq!(results[0], (true, true, 2, 2, 0));
        assert_eq!(results[3], (true, false, 2, 2, 1));
        assert_eq!(results[4], (false, false, 1, 1, 0));
    }

    #[test]
    fn test_invalid_shape() {
        let results = ThreadUniverse::run(3, |comm| Grid::new(comm, 2).err());
        assert!(matches!(results[0], Some(Error::InvalidGrid(_))));
    }

    #[test]
    fn test_square() {
        let results = ThreadUniverse::run(6, |comm| {
            let grid = Grid::square(comm).unwrap();
            (grid.height(), grid.width())
        });
        assert_eq!(results[0], (2, 3));
    }
}
