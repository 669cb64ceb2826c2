use async_std::task::JoinHandle;

/// A spawned task that is cancelled when dropped.
///
/// Used for background loops (e.g. the Manager's heartbeat) that must not
/// outlive the object that owns them.
pub struct ChildTask {
    handle: Option<JoinHandle<()>>,
}

impl ChildTask {
    pub fn spawn<Fut: 'static + std::future::Future<Output = ()> + Send>(future: Fut) -> Self {
        Self {
            handle: Some(async_std::task::spawn(future)),
        }
    }

    pub async fn join(mut self) {
        let handle = self.handle.take().unwrap();
        handle.await;
    }
}

impl Drop for ChildTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            async_std::task::spawn(handle.cancel());
        }
    }
}
