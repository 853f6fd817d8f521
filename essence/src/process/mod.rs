/// Raw inputs: sources, per-input properties and the cadence cursor.
///
/// Provides [`RawInput`](input::RawInput), the unit the rest of the pipeline
/// works on, and the tri-state [`OptProp`](input::OptProp) used for every
/// overridable property.
pub mod input;

/// Sample reader for header-less essence streams.
pub mod reader;

/// RIFF/WAVE sound input.
pub mod wave;

/// PCM sample layout helpers.
pub mod pcm;

/// Sound sample cadence per video frame.
pub mod cadence;

/// Essence type resolution from the first access unit.
pub mod resolve;

/// Routing of input sound channels to output tracks.
///
/// Provides the [`TrackMapper`](track_map::TrackMapper), a pure function from
/// input descriptors and a routing expression to output track maps.
pub mod track_map;

/// Input/output track arena bound to the writer.
pub mod graph;

/// Clip writer interface.
pub mod writer;

/// Frame-synchronous multiplex loop.
pub mod mux;

/// Wrap driver sequencing resolution, mapping and multiplexing.
///
/// Provides [`WrapJob`](wrap::WrapJob) and its [`WrapOptions`](wrap::WrapOptions).
pub mod wrap;
