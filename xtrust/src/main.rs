//! xtrust: inspect certificates and PKCS#12 archives, verify certificate chains.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use xtrust_lib::{
    DigestAlgorithm, Provider, ProviderConfig, Purpose, TrustStore, VerificationResult,
    VerifyFlags, VerifyParam, X509Format, X509,
};

#[derive(Parser)]
#[command(
    name = "xtrust",
    about = "Inspect certificates and PKCS#12 archives and verify certificate chains",
    long_about = "xtrust parses X.509 certificates (PEM or DER) and PKCS#12 archives,\n\
                  and verifies certificate chains against a trust store.\n\n\
                  PEM and DER are told apart automatically; --pem and --der override\n\
                  the guess. Without a FILE argument, input comes from stdin.\n\
                  Set RUST_LOG (e.g. RUST_LOG=debug) for diagnostic logging.",
    after_help = "EXAMPLES:\n\
                  \n  xtrust show cert.pem\
                  \n  xtrust field subject cert.pem\
                  \n  xtrust field fingerprint --digest sha1 cert.der\
                  \n  xtrust verify --CAfile ca.pem --host www.example.com chain.pem\
                  \n  xtrust verify --CApath /etc/ssl/certs --failures-only certs/\
                  \n  xtrust pkcs12 --password secret identity.p12"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a certificate as text, in the layout of `openssl x509 -text`
    Show {
        /// PEM or DER certificate; stdin when absent
        file: Option<PathBuf>,
        /// Treat the input as DER
        #[arg(long)]
        der: bool,
        /// Treat the input as PEM
        #[arg(long)]
        pem: bool,
        /// Append the certificate in PEM form after the text dump
        #[arg(long)]
        export: bool,
    },
    /// Print one certificate attribute
    Field {
        field: FieldName,
        /// PEM or DER certificate; stdin when absent
        file: Option<PathBuf>,
        #[arg(long)]
        der: bool,
        #[arg(long)]
        pem: bool,
        /// Fingerprint digest (sha1, sha256, sha384, sha512)
        #[arg(long, value_name = "ALG", default_value = "sha256")]
        digest: String,
    },
    /// Verify a certificate chain (exit code 0 = valid, 2 = invalid)
    #[command(
        after_help = "FILE is a PEM bundle with the leaf certificate first, followed by\n\
                      intermediates, or a directory of such files. Without --CAfile or\n\
                      --CApath the system trust store is used.\n\
                      \nPURPOSE VALUES:\n\
                      \n  sslclient sslserver nssslserver smimesign smimeencrypt\
                      \n  crlsign any ocsphelper timestampsign"
    )]
    Verify {
        /// Chain file or directory. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Expected host name; repeat to accept any of several
        #[arg(long = "host", value_name = "HOSTNAME")]
        hosts: Vec<String>,
        #[arg(long = "CAfile", visible_alias = "ca-file", value_name = "FILE")]
        ca_file: Option<PathBuf>,
        #[arg(long = "CApath", visible_alias = "ca-path", value_name = "DIR")]
        ca_path: Option<PathBuf>,
        /// Extra untrusted intermediates (PEM bundle)
        #[arg(long, value_name = "PEM")]
        untrusted: Option<PathBuf>,
        /// Also trust the system roots when --CAfile or --CApath is given
        #[arg(long)]
        system_roots: bool,
        #[arg(long)]
        no_check_time: bool,
        /// Accept a trusted intermediate as the anchor
        #[arg(long)]
        partial_chain: bool,
        #[arg(long)]
        x509_strict: bool,
        #[arg(long, value_name = "NAME")]
        purpose: Option<String>,
        #[arg(long, value_name = "ADDR")]
        verify_email: Option<String>,
        #[arg(long, value_name = "ADDR")]
        verify_ip: Option<String>,
        /// Verify at this Unix time instead of now
        #[arg(long, value_name = "EPOCH", conflicts_with = "valid_for")]
        attime: Option<i64>,
        /// Verify as of now plus DURATION (e.g. 30d)
        #[arg(long = "in", value_name = "DURATION")]
        valid_for: Option<String>,
        #[arg(long, value_name = "N")]
        verify_depth: Option<i32>,
        /// PEM file of CRLs consulted by --crl-check
        #[arg(long = "CRLfile", visible_alias = "crl-file", value_name = "PEM")]
        crl_file: Option<PathBuf>,
        #[arg(long)]
        crl_check: bool,
        #[arg(long)]
        crl_check_all: bool,
        #[arg(long)]
        show_chain: bool,
        #[arg(long)]
        json: bool,
        /// With a directory, report only the files that fail
        #[arg(long)]
        failures_only: bool,
        /// With a directory, descend into subdirectories
        #[arg(short, long)]
        recurse: bool,
    },
    /// Summarize a PKCS#12 archive
    Pkcs12 {
        /// PKCS#12 file. Reads from stdin if omitted.
        file: Option<PathBuf>,
        #[arg(long, default_value = "")]
        password: String,
        /// Print the archive's certificates as PEM
        #[arg(long)]
        certs: bool,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum FieldName {
    Subject,
    Issuer,
    Serial,
    NotBefore,
    NotAfter,
    Fingerprint,
    Version,
    SignatureAlgorithm,
    KeyAlgorithm,
    SubjectHash,
    SubjectKeyId,
}

/// Inputs larger than this are refused.
const INPUT_LIMIT: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    let Some(path) = file else {
        let mut buf = Vec::new();
        std::io::stdin()
            .take(INPUT_LIMIT)
            .read_to_end(&mut buf)
            .context("reading stdin")?;
        return Ok(buf);
    };
    let len = std::fs::metadata(path)
        .with_context(|| format!("cannot stat {}", path.display()))?
        .len();
    anyhow::ensure!(
        len <= INPUT_LIMIT,
        "{} is {} bytes; inputs are limited to {} bytes",
        path.display(),
        len,
        INPUT_LIMIT
    );
    std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn parse_input(provider: &Provider, input: &[u8], der: bool, pem: bool) -> Result<X509> {
    let cert = if der {
        provider.x509_from_data(input, X509Format::Der)?
    } else if pem {
        provider.x509_from_data(input, X509Format::Pem)?
    } else {
        provider.x509_from_raw(input)?
    };
    Ok(cert)
}

/// Bare digits are seconds; anything else goes through humantime ("30d", "1h 30m").
fn parse_duration(text: &str) -> Result<Duration> {
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(Duration::from_secs(text.parse()?));
    }
    humantime::parse_duration(text).with_context(|| format!("bad duration '{text}'"))
}

/// The instant to verify at: an explicit epoch, now plus a duration, or
/// `None` for the current time.
fn verification_time(attime: Option<i64>, valid_for: Option<&str>) -> Result<Option<OffsetDateTime>> {
    if let Some(epoch) = attime {
        let at = OffsetDateTime::from_unix_timestamp(epoch)
            .with_context(|| format!("Invalid epoch: {epoch}"))?;
        return Ok(Some(at));
    }
    match valid_for {
        Some(d) => {
            let ahead = time::Duration::try_from(parse_duration(d)?)
                .context("Duration out of range")?;
            let at = OffsetDateTime::now_utc()
                .checked_add(ahead)
                .context("Duration out of range")?;
            Ok(Some(at))
        }
        None => Ok(None),
    }
}

const CERT_EXTENSIONS: &[&str] = &["pem", "der", "crt", "cer"];

fn is_cert_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CERT_EXTENSIONS.iter().any(|c| ext.eq_ignore_ascii_case(c)))
}

/// Certificate files under `dir`, sorted. Only the top level unless `recurse`.
fn find_cert_files(dir: &Path, recurse: bool) -> Vec<PathBuf> {
    let depth = if recurse { usize::MAX } else { 1 };
    let mut found: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(depth)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && is_cert_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    found
}

/// Outcome of one file in a directory run.
struct FileOutcome {
    label: String,
    ok: bool,
    line: String,
}

/// Verify every file in parallel, print in path order, and return the
/// number of failures.
fn verify_files(files: &[PathBuf], setup: &VerifySetup, failures_only: bool) -> usize {
    let outcomes: Vec<FileOutcome> = files
        .par_iter()
        .map(|path| {
            let label = path.display().to_string();
            let verified = std::fs::read(path)
                .with_context(|| format!("cannot read {}", label))
                .and_then(|data| setup.verify_bytes(&data));
            match verified {
                Ok(result) => FileOutcome {
                    label,
                    ok: result.is_valid,
                    line: result.to_string(),
                },
                Err(e) => FileOutcome {
                    label,
                    ok: false,
                    line: format!("error: {:#}", e),
                },
            }
        })
        .collect();

    for outcome in outcomes.iter().filter(|o| !(failures_only && o.ok)) {
        if outcome.ok {
            println!("{}: {}", outcome.label, outcome.line);
        } else {
            eprintln!("{}: {}", outcome.label, outcome.line);
        }
    }
    outcomes.iter().filter(|o| !o.ok).count()
}

fn print_verify_result(label: &str, result: &VerificationResult, json: bool, show_chain: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    if result.is_valid {
        println!("{}: {}", label, result);
    } else {
        eprintln!("{}: {}", label, result);
        for failure in &result.errors {
            eprintln!("  {}", failure);
        }
    }
    if show_chain {
        for info in &result.chain {
            println!("  {} s:{}", info.depth, info.subject);
            println!("    i:{}", info.issuer);
        }
    }
    Ok(())
}

/// Trust anchors for a verify run.
///
/// Explicit `--CAfile`/`--CApath` are the only anchors, plus the system roots
/// when asked for. Otherwise `SSL_CERT_FILE`/`SSL_CERT_DIR` (through the
/// provider's config) take the place of the system roots.
fn anchor_store(
    provider: &Provider,
    ca_file: Option<&Path>,
    ca_path: Option<&Path>,
    system_roots: bool,
) -> Result<TrustStore> {
    if ca_file.is_some() || ca_path.is_some() {
        let mut store = TrustStore::new();
        store
            .load_locations(ca_file, ca_path)
            .context("loading trust anchors")?;
        if system_roots {
            store.add_trusted_roots()?;
        }
        return Ok(store);
    }
    let config = provider.config();
    if config.ca_file.is_some() || config.ca_dir.is_some() {
        return provider
            .create_store()
            .context("loading trust anchors from SSL_CERT_FILE/SSL_CERT_DIR");
    }
    let mut store = TrustStore::new();
    store.add_trusted_roots()?;
    Ok(store)
}

/// Everything a verify run shares across files.
struct VerifySetup {
    provider: Provider,
    store: TrustStore,
    param: VerifyParam,
    untrusted: Vec<X509>,
}

impl VerifySetup {
    /// Leaf first, then any intermediates in the same file, then --untrusted.
    fn verify_bytes(&self, data: &[u8]) -> Result<VerificationResult> {
        let mut chain = if is_pem_input(data) {
            self.provider.x509_chain_from_pem(data)?
        } else {
            vec![self.provider.x509_from_data(data, X509Format::Der)?]
        };
        if chain.is_empty() {
            anyhow::bail!("no certificate found");
        }
        let leaf = chain.remove(0);
        for extra in &self.untrusted {
            chain.push(extra.copy()?);
        }
        Ok(self
            .provider
            .verify_chain(&self.store, &leaf, &chain, Some(&self.param))?)
    }
}

fn is_pem_input(data: &[u8]) -> bool {
    X509Format::detect(data) == X509Format::Pem
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let provider = Provider::new(ProviderConfig::from_env());

    match &cli.command {
        Commands::Show {
            file,
            der,
            pem,
            export,
        } => {
            let input = read_input(file.as_ref())?;
            let cert = parse_input(&provider, &input, *der, *pem)?;
            let mut stdout = std::io::stdout().lock();
            if *export {
                cert.export_as_pem(&mut stdout, true)?;
            } else {
                cert.print(&mut stdout)?;
            }
        }
        Commands::Field {
            field,
            file,
            der,
            pem,
            digest,
        } => {
            let input = read_input(file.as_ref())?;
            let cert = parse_input(&provider, &input, *der, *pem)?;

            let output = match field {
                FieldName::Subject => cert.subject_name_string()?,
                FieldName::Issuer => cert.issuer_name_string()?,
                FieldName::Serial => hex::encode_upper(cert.serial_number(false)?),
                FieldName::NotBefore => format_time(cert.not_before()?)?,
                FieldName::NotAfter => format_time(cert.not_after()?)?,
                FieldName::Fingerprint => {
                    let alg: DigestAlgorithm = digest.parse()?;
                    cert.fingerprint(alg)?
                }
                FieldName::Version => (cert.version()? + 1).to_string(),
                FieldName::SignatureAlgorithm => cert.signature_algorithm()?.to_string(),
                FieldName::KeyAlgorithm => {
                    let mut key = cert.public_key()?;
                    let alg = key.algorithm()?.to_string();
                    key.close();
                    alg
                }
                FieldName::SubjectHash => format!("{:08x}", cert.subject_name_hash()?),
                FieldName::SubjectKeyId => cert
                    .subject_key_identifier()?
                    .map(hex::encode_upper)
                    .unwrap_or_default(),
            };
            println!("{}", output);
        }
        Commands::Verify {
            file,
            hosts,
            ca_file,
            ca_path,
            untrusted,
            system_roots,
            no_check_time,
            partial_chain,
            x509_strict,
            purpose,
            verify_email,
            verify_ip,
            attime,
            valid_for,
            verify_depth,
            crl_file,
            crl_check,
            crl_check_all,
            show_chain,
            json,
            failures_only,
            recurse,
        } => {
            anyhow::ensure!(
                crl_file.is_some() || !(*crl_check || *crl_check_all),
                "CRL checking needs --CRLfile"
            );

            let mut store =
                anchor_store(&provider, ca_file.as_deref(), ca_path.as_deref(), *system_roots)?;
            if let Some(crl_path) = crl_file {
                store
                    .load_locations(Some(crl_path), None)
                    .with_context(|| format!("loading CRLs from {}", crl_path.display()))?;
            }

            let mut param = provider.ssl_server_params().copy()?;
            match purpose {
                Some(p) => param.set_purpose(p.parse::<Purpose>()?)?,
                None => param.set_purpose(Purpose::Any)?,
            }
            for host in hosts {
                param.add_host(host)?;
            }
            if let Some(email) = verify_email {
                param.set_email(email)?;
            }
            if let Some(ip) = verify_ip {
                param.set_ip(ip)?;
            }
            if let Some(depth) = verify_depth {
                param.set_depth(*depth)?;
            }
            if let Some(at) = verification_time(*attime, valid_for.as_deref())? {
                param.set_time(at)?;
            }
            let mut flags = VerifyFlags::DEFAULT;
            for (set, flag) in [
                (*no_check_time, VerifyFlags::NO_CHECK_TIME),
                (*partial_chain, VerifyFlags::PARTIAL_CHAIN),
                (*x509_strict, VerifyFlags::X509_STRICT),
                (*crl_check, VerifyFlags::CRL_CHECK),
                (*crl_check_all, VerifyFlags::CRL_CHECK_ALL),
            ] {
                if set {
                    flags |= flag;
                }
            }
            param.set_flags(flags)?;

            let untrusted = match untrusted {
                Some(path) => {
                    let data = std::fs::read(path).with_context(|| {
                        format!("cannot read {}", path.display())
                    })?;
                    provider.x509_chain_from_pem(&data)?
                }
                None => Vec::new(),
            };
            let setup = VerifySetup {
                provider,
                store,
                param,
                untrusted,
            };

            if let Some(dir) = file.as_ref().filter(|p| p.is_dir()) {
                let files = find_cert_files(dir, *recurse);
                anyhow::ensure!(
                    !files.is_empty(),
                    "{} holds no .pem, .der, .crt or .cer files",
                    dir.display()
                );
                if verify_files(&files, &setup, *failures_only) > 0 {
                    std::process::exit(2);
                }
                return Ok(());
            }

            let input = read_input(file.as_ref())?;
            let label = match file {
                Some(path) => path.display().to_string(),
                None => "stdin".to_string(),
            };
            let result = setup.verify_bytes(&input)?;
            print_verify_result(&label, &result, *json, *show_chain)?;
            if !result.is_valid {
                std::process::exit(2);
            }
        }
        Commands::Pkcs12 {
            file,
            password,
            certs,
        } => {
            let input = read_input(file.as_ref())?;
            let mut archive = provider.create_pkcs12();
            archive
                .import(&input, password)
                .context("importing PKCS#12 archive")?;

            if archive.has_private_key()? {
                let mut key = archive.private_key()?;
                println!("private key: {}", key.algorithm()?);
                key.close();
            } else {
                println!("private key: none");
            }
            let count = archive.count()?;
            println!("certificates: {}", count);
            let mut stdout = std::io::stdout().lock();
            for i in 0..count {
                let cert = archive.certificate(i)?;
                println!("  [{}] {}", i, cert.subject_name_string()?);
                if *certs {
                    cert.export_as_pem(&mut stdout, false)?;
                }
            }
            archive.close();
        }
    }

    Ok(())
}

fn format_time(t: OffsetDateTime) -> Result<String> {
    Ok(t.format(&time::format_description::well_known::Rfc3339)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_seconds_and_units() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(2 * 86400));
        assert_eq!(
            parse_duration("1h 15m").unwrap(),
            Duration::from_secs(3600 + 15 * 60)
        );
    }

    #[test]
    fn durations_reject_junk() {
        for bad in ["", "-5", "5 parsecs", "1.5"] {
            assert!(parse_duration(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn epoch_wins() {
        let at = verification_time(Some(86400), None).unwrap().unwrap();
        assert_eq!(at.unix_timestamp(), 86400);
    }

    fn write_root(dir: &Path, name: &str, cn: &str) -> PathBuf {
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, cert.pem()).unwrap();
        path
    }

    #[test]
    fn explicit_ca_file_replaces_configured_anchors() {
        let tmp = tempfile::tempdir().unwrap();
        let configured = write_root(tmp.path(), "env.pem", "Env Root");
        let explicit = write_root(tmp.path(), "cli.pem", "Cli Root");
        let provider = Provider::new(ProviderConfig {
            ca_file: Some(configured),
            ..ProviderConfig::default()
        });

        let store = anchor_store(&provider, Some(&explicit), None, false).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let store = anchor_store(&provider, None, None, false).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn corrupt_ca_file_stops_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corrupt.der");
        std::fs::write(&path, b"not der").unwrap();
        let err = anchor_store(&Provider::default(), Some(&path), None, false).unwrap_err();
        assert!(format!("{:#}", err).contains("loading trust anchors"));
    }

    #[test]
    fn duration_is_relative_to_now() {
        let before = OffsetDateTime::now_utc();
        let at = verification_time(None, Some("1d")).unwrap().unwrap();
        assert!(at - before >= time::Duration::days(1));
        assert!(verification_time(None, None).unwrap().is_none());
    }

    #[test]
    fn cert_extensions_are_case_insensitive() {
        assert!(is_cert_file(Path::new("chain.PEM")));
        assert!(is_cert_file(Path::new("root.cer")));
        assert!(!is_cert_file(Path::new("key.p8")));
        assert!(!is_cert_file(Path::new("README")));
    }

    #[test]
    fn find_cert_files_sorted_and_flat() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.pem"), b"x").unwrap();
        std::fs::write(tmp.path().join("a.crt"), b"x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub").join("c.der"), b"x").unwrap();

        let flat = find_cert_files(tmp.path(), false);
        assert_eq!(
            flat,
            vec![tmp.path().join("a.crt"), tmp.path().join("b.pem")]
        );
        assert_eq!(find_cert_files(tmp.path(), true).len(), 3);
    }

}
