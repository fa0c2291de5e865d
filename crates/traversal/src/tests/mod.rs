//! Transport test doubles and connection-handler scenarios


pub(crate) use recording_stream::RecordingStream;
