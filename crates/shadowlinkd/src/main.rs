use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stderr = io::stderr().lock();
    shadowlinkd::run(std::env::args_os(), &mut stderr).into()
}
