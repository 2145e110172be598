use std::env;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use petct_register::loader::SliceStack;
use petct_register::progress::{ProgressEvent, ProgressSink};
use petct_register::{Config, Registration, Study, config};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let usage = "usage: petct-register <ct-dir> <pet-ct-dir> <out-dir>";
    let ct_dir = PathBuf::from(args.next().expect(usage));
    let pet_ct_dir = PathBuf::from(args.next().expect(usage));
    let out_dir = PathBuf::from(args.next().expect(usage));

    println!("{} {}", config::application_name(), config::version_string());

    let (tx, rx) = mpsc::channel::<ProgressEvent>();
    let reporter = thread::spawn(move || {
        for event in rx {
            println!("{}: {} / {}", event.message, event.index + 1, event.total);
        }
    });
    let progress = ProgressSink::new(tx);

    let mut study = Study::new(Config::default());
    let ct = SliceStack::scan(&ct_dir)
        .and_then(|stack| stack.load(&progress))
        .expect("should have loaded the CT volume");
    study.attach_ct(ct);

    let pet_ct = SliceStack::scan(&pet_ct_dir)
        .and_then(|stack| stack.load(&progress))
        .expect("should have loaded the PET-CT volume");
    study.attach_pet_ct(pet_ct);
    study
        .rescale_pet_ct_volume()
        .expect("both volumes are loaded");

    let registration = Registration::new();
    let exporter = study
        .begin_export(&out_dir, &registration)
        .expect("both volumes are loaded");
    let written = exporter
        .spawn(progress)
        .join()
        .expect("export worker should not panic")
        .expect("should have exported the registered volume");

    reporter.join().expect("progress reporter should not panic");
    println!("wrote {written} slices to {}", out_dir.display());
}
