pub mod cube;
pub mod error;
pub mod gridder;
pub mod healpix;
pub mod kernel;
pub mod lookup;
pub mod pybindings;
pub mod shapes;
pub mod sphgeom;

pub use cube::{Cube, GridFloat};
pub use error::{GridError, GridResult};
pub use gridder::Gridder;
pub use kernel::KernelParams;
