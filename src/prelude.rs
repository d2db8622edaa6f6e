//! Prelude (helpful reexports) for this package

pub use crate::{
    aligner::ClockAligner,
    core::Direction,
    gearbox::Gearbox,
    init::{
        InitSequencer,
        SequencerConfig,
        Stage,
    },
    link::{
        LinkConfig,
        LinkController,
        LinkState,
    },
    pll::{
        CdrConfigTable,
        ChannelPllConfig,
    },
    prbs::{
        PrbsChecker,
        PrbsGenerator,
        PrbsPattern,
    },
    transceiver::{
        mock::Mock,
        Transceiver,
    },
};
