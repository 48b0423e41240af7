pub mod bid_history;
pub mod bid_placement;
pub mod board;
pub mod connection;
pub mod golf;
pub mod reconciliation;
pub mod ui;

pub use self::{
    bid_history::*, bid_placement::*, board::*, connection::*, golf::*, reconciliation::*, ui::*,
};
use anyhow::{bail, format_err, Result};
use std::{
    sync::{
        atomic::{self, AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tracing::{error, info, info_span};

pub type ServiceIdRef<'a> = &'a str;

/// A service that is a loop that does something
///
/// Every iteration should return within about a second, so that stopping
/// the service is never held up for long.
pub trait LoopService: Send + Sync {
    fn run_iteration(&mut self) -> Result<()>;
}

/// Service execution control instance
///
/// All services are basically a loop, and we would like to be able to
/// gracefully terminate them, and handle and top-level error of any
/// of them by gracefully stopping everything else.
#[derive(Clone, Default)]
pub struct ServiceControl {
    stop_all: Arc<AtomicBool>,
}

impl ServiceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_all(&self) {
        self.stop_all.store(true, Ordering::SeqCst);
    }

    pub fn spawn_loop(
        &self,
        service_id: ServiceIdRef,
        mut service: impl LoopService + 'static,
    ) -> JoinHandle {
        self.spawn_loop_raw(service_id, move || service.run_iteration())
    }

    /// Start a new service as a loop, with a certain body
    ///
    /// This will take care of checking termination condition and
    /// handling any errors returned by `f`
    fn spawn_loop_raw<F>(&self, service_id: ServiceIdRef, mut f: F) -> JoinHandle
    where
        F: FnMut() -> Result<()> + Send + Sync + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let service_id = service_id.to_owned();

        JoinHandle::new(
            stop.clone(),
            thread::spawn({
                let stop_all = self.stop_all.clone();
                move || {
                    let _span = info_span!("service", id = %service_id).entered();
                    info!("service started");
                    let res = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        while !stop.load(atomic::Ordering::SeqCst)
                            && !stop_all.load(atomic::Ordering::SeqCst)
                        {
                            if let Err(e) = f() {
                                stop_all.store(true, atomic::Ordering::SeqCst);
                                return Err(e);
                            }
                        }
                        Ok(())
                    })) {
                        Err(_e) => {
                            stop_all.store(true, atomic::Ordering::SeqCst);
                            bail!("service {service_id} panicked");
                        }
                        Ok(res) => res,
                    };
                    match &res {
                        Ok(()) => info!("service stopped"),
                        Err(e) => error!(error = %e, "service failed; stopping everything"),
                    }
                    res
                }
            }),
        )
    }
}

/// Simple thread join wrapper that joins the thread on drop
pub struct JoinHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl JoinHandle {
    fn new(stop: Arc<AtomicBool>, handle: thread::JoinHandle<Result<()>>) -> Self {
        JoinHandle {
            stop,
            thread: Some(handle),
        }
    }
}

impl JoinHandle {
    fn join_mut(&mut self) -> Result<()> {
        if let Some(h) = self.thread.take() {
            h.join().map_err(|e| format_err!("join failed: {:?}", e))?
        } else {
            Ok(())
        }
    }

    pub fn join(mut self) -> Result<()> {
        self.join_mut()
    }
}

impl Drop for JoinHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.join_mut() {
            error!(error = %e, "service ended with an error");
        }
    }
}
