mod support;

mod emitter_test;
mod file_test;
mod http_input_test;
mod modifier_test;
mod proto_test;
mod stats_test;
