//! Level-set maintenance: combination with solids, extrapolation, narrow-band tracking,
//! marching-cubes volume, and fast-march redistancing (spec §4.1, §4.2).

pub mod marching_cubes;
pub mod redistancer;
pub mod util;

pub use marching_cubes::get_cell_volume;
pub use redistancer::{fastmarch, Graph, GraphNode};
