//! Network driver seam.
//!
//! NIC drivers implement [`NetworkDriver`] and register themselves here;
//! the protocol stack talks only to this module. Hosted builds register a
//! loopback test device whose TX frames are captured and whose RX queue is
//! injectable, which is how the stack's wire behavior is unit tested.

use alloc::boxed::Box;

use crate::sync::spinlock::Spinlock;

/// Maximum Ethernet frame size handled by the stack (no VLAN, no jumbo).
pub const MAX_FRAME: usize = 1514;

/// Unified NIC interface.
pub trait NetworkDriver: Send {
    /// Human-readable driver name.
    fn name(&self) -> &str;
    /// Station MAC address.
    fn mac(&self) -> [u8; 6];
    /// Transmit one frame. Returns false if the device rejected it.
    fn transmit(&mut self, frame: &[u8]) -> bool;
    /// Pull the next received frame into `buf`, returning its length.
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize>;
}

static NET: Spinlock<Option<Box<dyn NetworkDriver>>> = Spinlock::new(None);

/// Register a NIC driver (called from driver init).
pub fn register(driver: Box<dyn NetworkDriver>) {
    log::info!("netdev: registered '{}'", driver.name());
    *NET.lock() = Some(driver);
}

/// Run a closure against the registered driver.
pub fn with_net<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut dyn NetworkDriver) -> R,
{
    let mut net = NET.lock();
    let driver = net.as_mut()?;
    Some(f(driver.as_mut()))
}

/// Transmit a frame via the registered driver.
pub fn transmit(frame: &[u8]) -> bool {
    with_net(|d| d.transmit(frame)).unwrap_or(false)
}

/// Receive the next pending frame.
pub fn receive(buf: &mut [u8]) -> Option<usize> {
    with_net(|d| d.receive(buf)).flatten()
}

/// MAC of the registered NIC.
pub fn mac() -> Option<[u8; 6]> {
    with_net(|d| d.mac())
}

pub fn is_available() -> bool {
    NET.lock().is_some()
}

// ── Hosted loopback test NIC ────────────────────────────────────────

#[cfg(not(target_os = "none"))]
mod test_nic {
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;

    use super::NetworkDriver;
    use crate::sync::spinlock::Spinlock;

    pub static TX_LOG: Spinlock<Vec<Vec<u8>>> = Spinlock::new(Vec::new());
    pub static RX_QUEUE: Spinlock<VecDeque<Vec<u8>>> = Spinlock::new(VecDeque::new());

    pub struct TestNic;

    impl NetworkDriver for TestNic {
        fn name(&self) -> &str {
            "test-loopback"
        }

        fn mac(&self) -> [u8; 6] {
            [0x52, 0x54, 0x00, 0x12, 0x34, 0x56]
        }

        fn transmit(&mut self, frame: &[u8]) -> bool {
            TX_LOG.lock().push(frame.to_vec());
            true
        }

        fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
            let frame = RX_QUEUE.lock().pop_front()?;
            let n = frame.len().min(buf.len());
            buf[..n].copy_from_slice(&frame[..n]);
            Some(n)
        }
    }
}

/// Install the loopback test NIC (hosted builds).
#[cfg(not(target_os = "none"))]
pub fn register_test_nic() {
    register(Box::new(test_nic::TestNic));
    test_nic::TX_LOG.lock().clear();
    test_nic::RX_QUEUE.lock().clear();
}

/// Queue a frame for the stack to receive on the next poll.
#[cfg(not(target_os = "none"))]
pub fn inject_rx_frame(frame: &[u8]) {
    test_nic::RX_QUEUE.lock().push_back(frame.to_vec());
}

/// Take every frame the stack has transmitted since the last call.
#[cfg(not(target_os = "none"))]
pub fn take_tx_frames() -> alloc::vec::Vec<alloc::vec::Vec<u8>> {
    core::mem::take(&mut *test_nic::TX_LOG.lock())
}
