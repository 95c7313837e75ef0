// Synchronization primitives
//
// A single semaphore pair shared by every frame. There are no fences: the CPU
// never waits on a submission, only the device drain at shutdown.

use anyhow::{Context, Result};
use ash::vk;

use crate::teardown::{TeardownSequencer, TeardownStep};

#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    /// Signalled by acquire, waited on by the submit
    pub image_available: vk::Semaphore,
    /// Signalled by the submit, waited on by present
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &ash::Device, ledger: &mut TeardownSequencer) -> Result<Self> {
        let image_available = create_semaphore(device, ledger)?;
        let render_finished = create_semaphore(device, ledger)?;

        Ok(Self {
            image_available,
            render_finished,
        })
    }
}

fn create_semaphore(device: &ash::Device, ledger: &mut TeardownSequencer) -> Result<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let semaphore = unsafe { device.create_semaphore(&semaphore_info, None) }
        .context("Failed to create semaphore")?;
    ledger.record(TeardownStep::Semaphore(semaphore));
    Ok(semaphore)
}
