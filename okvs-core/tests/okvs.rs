use std::num::NonZeroUsize;

use ark_babyjubjub::{EdwardsProjective, Fr};
use ark_ec::{CurveGroup as _, PrimeGroup as _};
use ark_ff::UniformRand as _;
use eyre::Context as _;
use num_bigint::BigUint;
use okvs_core::{
    BinaryOkvs, Block, ConfigError, EncodeFailure, FieldOkvs, OkvsConfig, OkvsParams, RowHasher,
    pack_biguint, unpack_biguint,
};
use rand::Rng as _;

const SEED: Block = Block::new(6800382592637124185);

fn install_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_blocks(n: usize) -> Vec<Block> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| Block::rand(&mut rng)).collect()
}

#[test]
fn binary_1024_items() -> eyre::Result<()> {
    install_tracing();
    let params = OkvsParams::derive(1024, 0.1, 40, SEED)?;
    assert_eq!(params.num_columns(), 1127);
    assert_eq!(params.band_width(), 169);

    let okvs = BinaryOkvs::new(params);
    let keys = random_blocks(1024);
    let values = random_blocks(1024);
    let codewords = okvs.encode(&keys, &values).context("while encoding")?;
    assert_eq!(codewords.len(), 1127);
    for (key, value) in keys.iter().zip(values.iter()) {
        assert_eq!(okvs.decode(&codewords, key), *value);
    }

    // non-members decode to some value without panicking
    let non_members = random_blocks(10);
    let decoded = okvs.decode_batch(&codewords, &non_members, NonZeroUsize::new(2).unwrap());
    assert_eq!(decoded.len(), 10);
    Ok(())
}

#[test]
fn binary_encode_is_deterministic() -> eyre::Result<()> {
    let params = OkvsParams::derive(1024, 0.1, 40, SEED)?;
    let keys = random_blocks(1024);
    let values = random_blocks(1024);
    let first = BinaryOkvs::new(params.clone()).encode(&keys, &values)?;
    let second = BinaryOkvs::new(params).encode(&keys, &values)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn band_spans_all_columns() -> eyre::Result<()> {
    let params = OkvsParams::derive(50, 0.1, 40, SEED)?;
    assert_eq!(params.num_columns(), 55);
    assert_eq!(params.band_width(), 55);

    let hasher = RowHasher::new(&params);
    let keys = random_blocks(50);
    assert!(keys.iter().all(|key| hasher.position(key) == 0));

    // a dense 50 x 55 system is singular every few seeds
    let values = random_blocks(50);
    let mut params = params;
    let mut attempt = 0u128;
    let (okvs, codewords) = loop {
        let okvs = BinaryOkvs::new(params.clone());
        match okvs.encode(&keys, &values) {
            Ok(codewords) => break (okvs, codewords),
            Err(_) if attempt < 32 => {
                attempt += 1;
                params = params.reseed(Block::new(attempt));
            }
            Err(err) => return Err(err).context("could not encode"),
        }
    };
    for (key, value) in keys.iter().zip(values.iter()) {
        assert_eq!(okvs.decode(&codewords, key), *value);
    }
    Ok(())
}

#[test]
fn unsupported_scaler_is_rejected() {
    assert_eq!(
        OkvsParams::derive(1024, 0.5, 40, SEED),
        Err(ConfigError::UnsupportedScaler { epsilon: 0.5 })
    );
}

#[test]
fn binary_batch_decode_matches_single_decode() -> eyre::Result<()> {
    let params = OkvsParams::derive(5000, 0.03, 40, SEED)?;
    let okvs = BinaryOkvs::new(params);
    let keys = random_blocks(5000);
    let values = random_blocks(5000);
    let codewords = okvs.encode(&keys, &values)?;
    for threads in [1, 4, 7] {
        let decoded = okvs.decode_batch(&codewords, &keys, NonZeroUsize::new(threads).unwrap());
        assert_eq!(decoded, values);
    }
    Ok(())
}

#[test]
fn params_survive_serialization() -> eyre::Result<()> {
    let params = OkvsParams::derive(2000, 0.05, 40, Block::new(7))?;
    let okvs = BinaryOkvs::new(params.clone());
    let keys = random_blocks(2000);
    let values = random_blocks(2000);
    let codewords = okvs.encode(&keys, &values)?;

    // the receiving party only gets the serialized parameters
    let json = serde_json::to_string(&params)?;
    let received: OkvsParams = serde_json::from_str(&json)?;
    assert_eq!(received, params);
    let decoder = BinaryOkvs::new(received);
    for (key, value) in keys.iter().zip(values.iter()).take(100) {
        assert_eq!(decoder.decode(&codewords, key), *value);
    }
    Ok(())
}

#[test]
fn long_values_carry_big_integers() -> eyre::Result<()> {
    let mut rng = rand::thread_rng();
    let params = OkvsParams::derive(256, 0.1, 40, SEED)?;
    let okvs = BinaryOkvs::new(params);
    let keys = random_blocks(256);
    let integers = (0..256)
        .map(|_| {
            let bytes = (0..64).map(|_| rng.r#gen::<u8>()).collect::<Vec<_>>();
            BigUint::from_bytes_le(&bytes)
        })
        .collect::<Vec<_>>();
    let values = integers
        .iter()
        .map(|i| pack_biguint(i, 4))
        .collect::<Result<Vec<_>, _>>()?;
    let codewords = okvs.encode_long(&keys, &values, 4)?;
    for (key, integer) in keys.iter().zip(integers.iter()) {
        assert_eq!(unpack_biguint(&okvs.decode_long(&codewords, key)), *integer);
    }
    Ok(())
}

#[test]
fn field_50_items() -> eyre::Result<()> {
    install_tracing();
    let mut rng = rand::thread_rng();
    let keys = random_blocks(50);
    let values = (0..50)
        .map(|_| vec![Fr::rand(&mut rng), Fr::rand(&mut rng)])
        .collect::<Vec<_>>();

    let mut params = OkvsParams::derive(50, 0.1, 40, SEED)?;
    let mut attempt = 0u128;
    let (okvs, codewords) = loop {
        let okvs = FieldOkvs::<EdwardsProjective>::new(params.clone());
        match okvs.encode(&keys, &values, 2) {
            Ok(codewords) => break (okvs, codewords),
            Err(err @ EncodeFailure::InsufficientPivots { .. }) if attempt < 32 => {
                tracing::debug!("retrying after {err}");
                attempt += 1;
                params = params.reseed(Block::new(attempt));
            }
            Err(err) => return Err(err).context("could not encode"),
        }
    };
    assert_eq!(codewords.len(), 55);
    assert!(codewords.iter().all(|c| c.len() == 2));
    for (key, value) in keys.iter().zip(values.iter()) {
        assert_eq!(okvs.decode(&codewords, key), *value);
    }
    Ok(())
}

#[test]
fn field_lifted_decode_yields_value_times_generator() -> eyre::Result<()> {
    let mut rng = rand::thread_rng();
    let params = OkvsParams::derive(500, 0.07, 40, SEED)?;
    let okvs = FieldOkvs::<EdwardsProjective>::new(params);
    let keys = random_blocks(500);
    let values = (0..500)
        .map(|_| vec![Fr::rand(&mut rng)])
        .collect::<Vec<_>>();
    let codewords = okvs.encode_lifted(&keys, &values, 1)?;

    let generator = EdwardsProjective::generator();
    let decoded = okvs.decode_lifted_batch(&codewords, &keys, NonZeroUsize::new(3).unwrap());
    for (decoded, value) in decoded.iter().zip(values.iter()) {
        assert_eq!(decoded[0], (generator * value[0]).into_affine());
    }
    Ok(())
}

#[test]
fn field_scalar_batch_decode() -> eyre::Result<()> {
    let mut rng = rand::thread_rng();
    let params = OkvsParams::derive(300, 0.1, 40, SEED)?;
    let okvs = FieldOkvs::<EdwardsProjective>::new(params);
    let keys = random_blocks(300);
    let values = (0..300)
        .map(|_| vec![Fr::rand(&mut rng); 3])
        .collect::<Vec<_>>();
    let codewords = okvs.encode(&keys, &values, 3)?;
    let decoded = okvs.decode_batch(&codewords, &keys, NonZeroUsize::new(5).unwrap());
    assert_eq!(decoded, values);
    Ok(())
}

#[test]
fn config_from_json() -> eyre::Result<()> {
    let config: OkvsConfig = serde_json::from_str(
        r#"{
            "epsilon": 0.03,
            "stat_sec_param": 40,
            "seed": 6800382592637124185,
            "decode_threads": 2
        }"#,
    )?;
    let params = config.params(1000)?;
    assert_eq!(params.num_columns(), 1030);

    let okvs = BinaryOkvs::new(params);
    let keys = random_blocks(1000);
    let values = random_blocks(1000);
    let codewords = okvs.encode(&keys, &values)?;
    assert_eq!(
        okvs.decode_batch(&codewords, &keys, config.decode_threads),
        values
    );
    Ok(())
}
