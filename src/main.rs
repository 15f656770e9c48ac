fn main() {
    if let Err(err) = replay_eval_lib::run() {
        eprintln!("replay-eval: {err:#}");
        std::process::exit(1);
    }
}
