//! Simulated board description

use esio_core::engine::{EngineKind, IMAGE_MAGIC};
use esio_core::mailbox::{Port, MAILBOX_ADDR};
use esio_host::chips::EsioSeries;
use esio_host::loader::StaticImages;

use crate::spi_nor::SpiNorConfig;

/// What the simulated target looks like
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Controller family; selects the FIU generation
    pub series: EsioSeries,
    /// Flash parts and the chip select each one hangs off
    pub flashes: Vec<(Port, SpiNorConfig)>,
    /// Where the working area allocator places its single area
    pub area_address: u32,
    /// Host milliseconds that pass per keep-alive
    pub keep_alive_ms: u64,
    /// Whether the core is halted when the session starts
    pub start_halted: bool,
}

impl SimConfig {
    /// Halted target of `series` with no flash attached
    pub fn new(series: EsioSeries) -> Self {
        Self {
            series,
            flashes: Vec::new(),
            area_address: MAILBOX_ADDR,
            keep_alive_ms: 1,
            start_halted: true,
        }
    }

    /// Attach a flash part to `port`
    pub fn with_flash(mut self, port: Port, flash: SpiNorConfig) -> Self {
        self.flashes.retain(|(p, _)| *p != port);
        self.flashes.push((port, flash));
        self
    }

    /// Move the working area
    pub fn with_area_address(mut self, address: u32) -> Self {
        self.area_address = address;
        self
    }

    /// Start with the core running
    pub fn running(mut self) -> Self {
        self.start_halted = false;
        self
    }

    /// Whether the board carries the NCT6692D FIU
    pub fn legacy_fiu(&self) -> bool {
        self.series == EsioSeries::Nct6692
    }
}

/// Stand-in resident image for `kind`
///
/// The simulator only looks at the engine marker; everything else is padding
/// where the vector table would sit.
pub fn sim_image(kind: EngineKind) -> Vec<u8> {
    let mut image = vec![0u8; 0x40];
    image.extend_from_slice(&IMAGE_MAGIC);
    image.push(kind.tag());
    image
}

/// Stand-in images for every engine
pub fn sim_images() -> StaticImages {
    [EngineKind::Fiu, EngineKind::LegacyFiu, EngineKind::Spim]
        .into_iter()
        .fold(StaticImages::new(), |images, kind| images.with(kind, sim_image(kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use esio_host::loader::ImageProvider;

    #[test]
    fn test_sim_image_carries_engine_marker() {
        for kind in [EngineKind::Fiu, EngineKind::LegacyFiu, EngineKind::Spim] {
            assert_eq!(EngineKind::from_image(&sim_image(kind)), Some(kind));
        }
        let images = sim_images();
        assert_eq!(
            EngineKind::from_image(&images.image(EngineKind::Spim).unwrap()),
            Some(EngineKind::Spim)
        );
    }

    #[test]
    fn test_with_flash_replaces_port() {
        let config = SimConfig::new(EsioSeries::Nct6694)
            .with_flash(Port::Shd, SpiNorConfig::new(0xEF4018, 0x100_0000))
            .with_flash(Port::Shd, SpiNorConfig::new(0xC22019, 0x200_0000));
        assert_eq!(config.flashes.len(), 1);
        assert_eq!(config.flashes[0].1.id, 0xC22019);
        assert!(!config.legacy_fiu());
    }
}
