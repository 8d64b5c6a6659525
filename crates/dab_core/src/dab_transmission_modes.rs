/// DAB transmission modes as defined in ETSI EN 300 401 clause 14.
/// Each mode trades symbol duration against carrier count and doppler tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DabTransmissionMode {
    I,
    II,
    III,
    IV,
}

impl TryFrom<u32> for DabTransmissionMode {
    type Error = u32;
    /// Converts the conventional mode index \[1,2,3,4\].
    fn try_from(mode: u32) -> Result<Self, Self::Error> {
        match mode {
            1 => Ok(DabTransmissionMode::I),
            2 => Ok(DabTransmissionMode::II),
            3 => Ok(DabTransmissionMode::III),
            4 => Ok(DabTransmissionMode::IV),
            mode => Err(mode),
        }
    }
}
