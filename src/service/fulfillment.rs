//! Post-payment side effects.
//!
//! Confirmed orders are handed to a queue and processed by a background
//! worker after the caller already has its response. Jobs run concurrently up
//! to a configured limit, so one slow carrier call never delays other orders.
//! Within a job, shipment creation and notification run side by side; a
//! failure in one never stops the other, and neither touches the payment state.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::checkout::CheckoutService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostPaymentJob { pub order_id: Uuid }

pub type JobSender = mpsc::UnboundedSender<PostPaymentJob>;
pub type JobReceiver = mpsc::UnboundedReceiver<PostPaymentJob>;

pub fn channel() -> (JobSender, JobReceiver) { mpsc::unbounded_channel() }

const MAX_IN_FLIGHT: usize = 1024;

pub fn spawn_worker(service: Arc<CheckoutService>, mut jobs: JobReceiver, max_in_flight: usize) -> JoinHandle<()> {
    let capacity = max_in_flight.clamp(1, MAX_IN_FLIGHT);
    let permits = Arc::new(Semaphore::new(capacity));
    tokio::spawn(async move {
        info!(max_in_flight = capacity, "Post-payment worker started");
        while let Some(job) = jobs.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else { break };
            let service = service.clone();
            tokio::spawn(async move {
                run_post_payment(&service, job).await;
                drop(permit);
            });
        }
        // Queue closed; wait for in-flight jobs.
        let _ = permits.acquire_many(capacity as u32).await;
        info!("Post-payment worker stopped");
    })
}

pub async fn run_post_payment(service: &CheckoutService, job: PostPaymentJob) {
    let (shipment, notified) = tokio::join!(
        service.create_shipment(job.order_id),
        service.send_confirmations(job.order_id),
    );

    match shipment {
        Ok(order) => {
            let awb = order.shipping().map(|s| s.awb.as_str()).unwrap_or_default();
            info!(order_id = %job.order_id, awb, "Post-payment shipment ready");
        }
        Err(e) => error!(order_id = %job.order_id, error = %e, "Shipment not created; order stays paid for operator retry"),
    }
    if let Err(e) = notified {
        warn!(order_id = %job.order_id, error = %e, "Order confirmation not fully delivered");
    }
}
