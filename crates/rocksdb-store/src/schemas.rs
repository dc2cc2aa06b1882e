use rollups_primitives::{Application, Buf20, Epoch, Input, Output, Report};

use crate::{
    define_table_with_default_codec, define_table_with_seek_key_codec, define_table_without_codec,
    impl_borsh_value_codec,
};

define_table_with_default_codec!(
    /// Registered applications by contract address.
    (ApplicationSchema) Buf20 => Application
);

define_table_with_seek_key_codec!(
    /// Epochs keyed by (application, epoch index).
    (EpochSchema) (Buf20, u64) => Epoch
);

define_table_with_default_codec!(
    /// Latest epoch index known per application. Maintained inside the same
    /// write batch that touches the epoch itself.
    (LastEpochSchema) Buf20 => u64
);

define_table_with_seek_key_codec!(
    /// Inputs keyed by (application, input index).
    (InputSchema) (Buf20, u64) => Input
);

define_table_with_seek_key_codec!(
    /// Outputs keyed by (application, output index).
    (OutputSchema) (Buf20, u64) => Output
);

define_table_with_seek_key_codec!(
    /// Reports keyed by (application, report index).
    (ReportSchema) (Buf20, u64) => Report
);

define_table_with_default_codec!(
    /// Next expected external-sequencer nonce per (sender, application).
    (EspressoNonceSchema) (Buf20, Buf20) => u64
);

define_table_with_default_codec!(
    /// Next dense input index to assign per application.
    (InputIndexSchema) Buf20 => u64
);

define_table_with_default_codec!(
    /// Highest external-sequencer block scanned per application.
    (EspressoBlockSchema) Buf20 => u64
);
