// Tests module
// Wire builders and scripted transports shared by the unit tests, plus
// end-to-end resolution walks and parser fuzzing.

pub mod mock;
