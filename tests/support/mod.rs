use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dataverse_pool::{ClientSource, Dispatchable, FaultClass, FnFaultClassifier, SeedError};
use futures::future::BoxFuture;

#[derive(Clone)]
pub struct MockHandle {
    pub dop: Option<usize>,
    pub calls: Arc<AtomicUsize>,
    pub fail_with: Option<MockFault>,
    pub fail_for: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    Throttled,
    TokenExpired,
}

impl Dispatchable for MockHandle {
    type Request = u32;
    type Response = u32;
    type Fault = MockFault;

    fn execute(&self, req: u32) -> BoxFuture<'_, Result<u32, MockFault>> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if attempt < self.fail_for {
            self.fail_with.map(Err).unwrap_or(Ok(req))
        } else {
            Ok(req)
        };
        Box::pin(async move { outcome })
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn recommended_dop(&self) -> Option<usize> {
        self.dop
    }

    fn clone_handle(&self) -> BoxFuture<'_, Result<Self, MockFault>> {
        Box::pin(async move { Ok(self.clone()) })
    }
}

pub struct MockSource {
    pub name: dataverse_pool::SourceName,
    pub max_pool_size: usize,
    pub dop: Option<usize>,
    pub fail_with: Option<MockFault>,
    pub fail_for: usize,
    pub seed_creations: Arc<AtomicUsize>,
}

impl ClientSource for MockSource {
    type Handle = MockHandle;

    fn name(&self) -> &dataverse_pool::SourceName {
        &self.name
    }

    fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    fn get_seed_client(&self) -> BoxFuture<'_, Result<Arc<MockHandle>, SeedError>> {
        self.seed_creations.fetch_add(1, Ordering::SeqCst);
        let dop = self.dop;
        let fail_with = self.fail_with;
        let fail_for = self.fail_for;
        Box::pin(async move {
            Ok(Arc::new(MockHandle {
                dop,
                calls: Arc::new(AtomicUsize::new(0)),
                fail_with,
                fail_for,
            }))
        })
    }

    fn invalidate_seed(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

pub fn mock_source(name: &str, dop: usize, max_pool_size: usize) -> Arc<dyn ClientSource<Handle = MockHandle>> {
    Arc::new(MockSource {
        name: dataverse_pool::SourceName::new(name),
        max_pool_size,
        dop: Some(dop),
        fail_with: None,
        fail_for: 0,
        seed_creations: Arc::new(AtomicUsize::new(0)),
    })
}

pub fn counting_source(
    name: &str,
    dop: usize,
    max_pool_size: usize,
) -> (Arc<dyn ClientSource<Handle = MockHandle>>, Arc<AtomicUsize>) {
    let seed_creations = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(MockSource {
        name: dataverse_pool::SourceName::new(name),
        max_pool_size,
        dop: Some(dop),
        fail_with: None,
        fail_for: 0,
        seed_creations: Arc::clone(&seed_creations),
    });
    (source, seed_creations)
}

pub fn flaky_source(
    name: &str,
    dop: usize,
    max_pool_size: usize,
    fail_with: MockFault,
    fail_for: usize,
) -> Arc<dyn ClientSource<Handle = MockHandle>> {
    Arc::new(MockSource {
        name: dataverse_pool::SourceName::new(name),
        max_pool_size,
        dop: Some(dop),
        fail_with: Some(fail_with),
        fail_for,
        seed_creations: Arc::new(AtomicUsize::new(0)),
    })
}

pub fn classifier() -> Arc<dyn dataverse_pool::FaultClassifier<MockFault>> {
    Arc::new(FnFaultClassifier::new(|fault: &MockFault| match fault {
        MockFault::Throttled => FaultClass::Throttle { retry_after: Duration::from_secs(30) },
        MockFault::TokenExpired => FaultClass::Auth { requires_reauthentication: true },
    }))
}
