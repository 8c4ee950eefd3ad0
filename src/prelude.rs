pub use crate::error::{SimError, SimResult};
pub use crate::executor::{JoinHandle, Task};
pub use crate::logic::{Logic, LogicVec};
pub use crate::rstb_obj::RstbObj;
pub use crate::signal::{ObjectKind, SimObject};
pub use crate::sim_if::{self, SimIf};
pub use crate::test::{RstbTests, Test};
pub use crate::trigger::{EdgeKind, Trigger};
pub use crate::utils;
pub use crate::value::Val;
pub use crate::{fail_test, pass_test, RstbResult};
pub use futures::future::FutureExt;
