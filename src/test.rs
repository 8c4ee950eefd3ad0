use futures::future::BoxFuture;

use crate::signal::SimObject;
use crate::RstbResult;

pub type TestFn = Box<dyn Fn(SimObject) -> BoxFuture<'static, RstbResult>>;

pub struct Test {
    pub name: String,
    generator: TestFn,
    pub result: Option<RstbResult>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl Test {
    pub fn new(
        name: &str,
        generator: impl Fn(SimObject) -> BoxFuture<'static, RstbResult> + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            generator: Box::new(generator),
            result: None,
            time_secs: 0.0,
            sim_time_ns: 0.0,
        }
    }

    pub(crate) fn start(&self, dut: SimObject) -> BoxFuture<'static, RstbResult> {
        (self.generator)(dut)
    }

    pub fn passed(&self) -> bool {
        matches!(self.result, Some(Ok(_)))
    }
}

#[derive(Default)]
pub struct RstbTests(Vec<Test>);

impl RstbTests {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.0.iter()
    }
    pub(crate) fn iter_mut(&mut self) -> core::slice::IterMut<'_, Test> {
        self.0.iter_mut()
    }
    pub fn push(&mut self, test: Test) {
        self.0.push(test);
    }
}

/// Collects `async fn(SimObject) -> RstbResult` test functions into [`RstbTests`].
#[macro_export]
macro_rules! tests {
    ($( $i:ident ),+ $(,)?) => {{
        let mut tests = $crate::test::RstbTests::new();
        $(tests.push($crate::test::Test::new(stringify!($i), |dut| {
            $crate::prelude::FutureExt::boxed($i(dut))
        }));)+
        tests
    }};
}
