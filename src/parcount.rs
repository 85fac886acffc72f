use std::io::{self, Write};
use std::process::exit;
use std::time::Instant;

use log::error;
use tokio::runtime::Builder;

use par_count::logging::set_logger_or_exit;
use par_count::util::*;
use par_count::{count_file, CountError, Summary};

#[inline(never)]
fn write_out(summary: &Summary, top: usize) -> io::Result<()> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    writeln!(stdout, "========= Top {} Characters =========", top)?;
    writeln!(stdout, "Ch\tFreq")?;
    writeln!(stdout, "-------------------------------------")?;
    for c in &summary.chars {
        writeln!(stdout, "{}\t{}", c.character as char, c.count)?;
    }

    writeln!(stdout)?;
    writeln!(stdout, "=========== Top {} Words ============", top)?;
    writeln!(stdout, "Word             \tID\tFreq")?;
    writeln!(stdout, "-------------------------------------")?;
    for w in &summary.words {
        let word = String::from_utf8_lossy(&w.word);
        writeln!(stdout, "{:<23}{:<10}{:<10}", word, w.first_occurrence, w.count)?;
    }
    Ok(())
}

fn run(conf: &Config) -> Result<Summary, CountError> {
    let input = conf.input()?;
    let options = conf.count_options();
    let runtime = Builder::new_multi_thread()
        .worker_threads(runtime_threads(options.workers))
        .enable_all()
        .build()?;
    runtime.block_on(count_file(input, &options))
}

fn main() {
    let conf = parse_args("character and word frequencies over partitioned workers");
    set_logger_or_exit(&conf.log, conf.log_level);

    let (start_usr_time, start_sys_time) = get_cputime_usecs();
    let start_time = Instant::now();

    let summary = match run(&conf) {
        Ok(summary) => summary,
        Err(err) => {
            error!("{}", err);
            eprintln!("error: {}", err);
            exit(1);
        }
    };
    if let Err(err) = write_out(&summary, conf.top) {
        eprintln!("error: can't write report: {}", err);
        exit(1);
    }

    let difference = start_time.elapsed();
    let (end_usr_time, end_sys_time) = get_cputime_usecs();
    let usr_time = (end_usr_time - start_usr_time) as f64 / 1000_000.0;
    let sys_time = (end_sys_time - start_sys_time) as f64 / 1000_000.0;
    eprintln!("walltime: {:?} (usr: {:.3}s sys: {:.3}s)",
        difference, usr_time, sys_time);
}
