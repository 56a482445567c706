//! Recalculation flags.
//!
//! These bits are what callers pass to the tag API and what is stored in the
//! legacy `recalc` field of original data-blocks. Many independent call
//! sites depend on the numeric values, so they are fixed here once.

bit_flags! {
    /// "Something about this data-block changed" bitmask.
    ///
    /// An empty mask is meaningful: it asks for the whole ID to be re-tagged.
    pub struct RecalcFlags: u32 {
        /// Object transform changed.
        const OB_RECALC_OB = 1 << 0;
        /// Object data (geometry, pose) changed.
        const OB_RECALC_DATA = 1 << 1;
        /// Time changed, animation must be re-evaluated.
        const OB_RECALC_TIME = 1 << 2;
        const OB_RECALC_ALL = (1 << 0) | (1 << 1) | (1 << 2);

        const PSYS_RECALC_REDO = 1 << 3;
        const PSYS_RECALC_RESET = 1 << 4;
        const PSYS_RECALC_TYPE = 1 << 5;
        const PSYS_RECALC_CHILD = 1 << 6;
        const PSYS_RECALC_PHYS = 1 << 7;
        /// Any particle-settings change.
        const PSYS_RECALC = (1 << 3) | (1 << 4) | (1 << 5) | (1 << 6) | (1 << 7);

        /// Refresh the copy-on-write snapshot.
        const DEG_TAG_COPY_ON_WRITE = 1 << 8;
        /// Shading changed.
        const DEG_TAG_SHADING_UPDATE = 1 << 9;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_values_are_stable() {
        assert_eq!(RecalcFlags::OB_RECALC_OB.bits(), 1);
        assert_eq!(RecalcFlags::OB_RECALC_DATA.bits(), 2);
        assert_eq!(RecalcFlags::OB_RECALC_TIME.bits(), 4);
        assert_eq!(RecalcFlags::PSYS_RECALC.bits(), 0b1111_1000);
        assert_eq!(RecalcFlags::DEG_TAG_COPY_ON_WRITE.bits(), 256);
        assert_eq!(RecalcFlags::DEG_TAG_SHADING_UPDATE.bits(), 512);
    }

    #[test]
    fn psys_bits_do_not_overlap_object_bits() {
        assert!(!RecalcFlags::PSYS_RECALC.intersects(RecalcFlags::OB_RECALC_ALL));
    }

    #[test]
    fn set_operations() {
        let mut flags = RecalcFlags::OB_RECALC_OB | RecalcFlags::DEG_TAG_COPY_ON_WRITE;
        assert!(flags.contains(RecalcFlags::OB_RECALC_OB));
        assert!(!flags.contains(RecalcFlags::OB_RECALC_ALL));
        assert!(flags.intersects(RecalcFlags::OB_RECALC_ALL));
        flags.remove(RecalcFlags::OB_RECALC_OB);
        assert_eq!(flags, RecalcFlags::DEG_TAG_COPY_ON_WRITE);
        assert!(RecalcFlags::empty().is_empty());
    }
}
