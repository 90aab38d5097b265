use embassy_time::{Duration, Instant, Ticker};
use rand_core::RngCore;

use crate::config::OverflowPolicy;
use crate::drivers::tlv::Record;
use crate::queue::{BoundedQueue, Full};

/// Produces the next sample for one telemetry source.
///
/// `previous` is the last record this source produced (after stamping), `entropy` the
/// source's private random stream. Seeding that stream makes a run replayable.
pub trait DataSource {
    type Record: Record;

    fn next_record(
        &mut self,
        previous: Option<&Self::Record>,
        entropy: &mut dyn RngCore,
    ) -> Self::Record;
}

/// Result of handing one sample to the queue.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Publish<R> {
    Enqueued,
    /// Enqueued after evicting the oldest queued sample.
    Overwrote,
    /// Queue full, the new sample was discarded.
    Dropped,
    /// Waited the configured time without a free slot; the sample was discarded.
    TimedOut,
    /// Queue full under a waiting policy. Only returned by the non-blocking path.
    WouldBlock(R),
}

/// Periodic producer: one `DataSource`, one queue, one overflow policy.
pub struct Producer<'a, D: DataSource, G, const N: usize> {
    source: D,
    entropy: G,
    queue: &'a BoundedQueue<D::Record, N>,
    policy: OverflowPolicy,
    previous: Option<D::Record>,
}

impl<'a, D, G, const N: usize> Producer<'a, D, G, N>
where
    D: DataSource,
    G: RngCore,
{
    pub fn new(source: D, entropy: G, queue: &'a BoundedQueue<D::Record, N>, policy: OverflowPolicy) -> Self {
        Self { source, entropy, queue, policy, previous: None }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn queue(&self) -> &'a BoundedQueue<D::Record, N> {
        self.queue
    }

    /// Draw the next record and stamp it with `now_ticks`.
    pub fn sample(&mut self, now_ticks: u64) -> D::Record {
        let mut record = self.source.next_record(self.previous.as_ref(), &mut self.entropy);
        record.stamp(now_ticks);
        self.previous = Some(record);
        record
    }

    /// Apply the overflow policy without suspending.
    ///
    /// Waiting policies hand the record back as `WouldBlock` when the queue is full. The
    /// producer is the queue's only writer, so a non-full check cannot be invalidated
    /// before the push.
    pub fn try_publish(&self, record: D::Record) -> Publish<D::Record> {
        match self.policy {
            OverflowPolicy::Block | OverflowPolicy::BlockFor(_) => {
                if self.queue.is_full() {
                    return Publish::WouldBlock(record);
                }
                match self.queue.try_push(record) {
                    Ok(()) => Publish::Enqueued,
                    Err(Full(record)) => Publish::WouldBlock(record),
                }
            }
            OverflowPolicy::DropOldest => match self.queue.push_overwrite(record) {
                None => Publish::Enqueued,
                Some(_) => Publish::Overwrote,
            },
            OverflowPolicy::DropNewest => match self.queue.try_push(record) {
                Ok(()) => Publish::Enqueued,
                Err(_) => Publish::Dropped,
            },
        }
    }

    /// Apply the overflow policy, suspending under `Block` / `BlockFor`.
    pub async fn publish(&self, record: D::Record) -> Publish<D::Record> {
        match self.policy {
            OverflowPolicy::Block => {
                self.queue.push(record).await;
                Publish::Enqueued
            }
            OverflowPolicy::BlockFor(timeout) => match self.queue.push_timeout(record, timeout).await {
                Ok(()) => Publish::Enqueued,
                Err(_) => Publish::TimedOut,
            },
            OverflowPolicy::DropOldest | OverflowPolicy::DropNewest => self.try_publish(record),
        }
    }

    /// Sample every `period` on absolute deadlines, forever.
    pub async fn run(mut self, period: Duration) -> ! {
        let kind = D::Record::TYPE;
        let mut ticker = Ticker::every(period);
        loop {
            ticker.next().await;
            let record = self.sample(Instant::now().as_ticks());
            match self.publish(record).await {
                Publish::Enqueued => {}
                Publish::Overwrote => trace!("{:?}: queue full, oldest sample evicted", kind),
                Publish::Dropped => debug!("{:?}: queue full, sample dropped", kind),
                Publish::TimedOut => debug!("{:?}: no slot within timeout, sample dropped", kind),
                Publish::WouldBlock(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::GpsSim;
    use crate::state::GpsRecord;
    use embassy_futures::block_on;
    use rand_core::SeedableRng;
    use rand_wyrand::WyRand;

    fn producer(
        queue: &BoundedQueue<GpsRecord, 2>,
        policy: OverflowPolicy,
    ) -> Producer<'_, GpsSim, WyRand, 2> {
        Producer::new(GpsSim, WyRand::seed_from_u64(3), queue, policy)
    }

    #[test]
    fn sample_is_stamped_and_chained() {
        let queue = BoundedQueue::new();
        let mut p = producer(&queue, OverflowPolicy::Block);
        let a = p.sample(10);
        let b = p.sample(20);
        assert_eq!((a.timestamp, b.timestamp), (10, 20));
        assert!(b.heading > a.heading);
    }

    #[test]
    fn block_policy_reports_would_block_when_full() {
        let queue = BoundedQueue::new();
        let mut p = producer(&queue, OverflowPolicy::Block);
        for t in 0..2 {
            let r = p.sample(t);
            assert_eq!(p.try_publish(r), Publish::Enqueued);
        }
        let r = p.sample(2);
        assert_eq!(p.try_publish(r), Publish::WouldBlock(r));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stats().rejected, 0);
    }

    #[test]
    fn drop_policies_never_wait() {
        let queue = BoundedQueue::new();
        let mut p = producer(&queue, OverflowPolicy::DropOldest);
        let records: [GpsRecord; 3] = core::array::from_fn(|t| p.sample(t as u64));
        for r in &records[..2] {
            assert_eq!(block_on(p.publish(*r)), Publish::Enqueued);
        }
        assert_eq!(block_on(p.publish(records[2])), Publish::Overwrote);
        assert_eq!(queue.try_pop().map(|r| r.timestamp), Some(1));

        let queue = BoundedQueue::new();
        let p = producer(&queue, OverflowPolicy::DropNewest);
        for r in &records[..2] {
            assert_eq!(p.try_publish(*r), Publish::Enqueued);
        }
        assert_eq!(p.try_publish(records[2]), Publish::Dropped);
        assert_eq!(queue.try_pop().map(|r| r.timestamp), Some(0));
    }
}
