use schnorrkel::context::SigningContext;
use schnorrkel::{Keypair, PublicKey, Signature};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"vrf-shootout-devnet";

/// Randomness fulfilled for one request, with the material to check it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfilment {
    /// 32-byte randomness handed to consumers
    pub output: Vec<u8>,
    /// Signature the output was hashed from
    pub proof: Vec<u8>,
    pub public_key: [u8; 32],
    /// Exact message that was signed
    pub input_message: String,
}

/// Signature-based randomness oracle for the devnet
pub struct RandomnessOracle {
    keypair: Arc<Keypair>,
}

impl RandomnessOracle {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Oracle with a fresh random keypair
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Produce randomness for `input_message`.
    ///
    /// The output is the SHA-256 of a schnorrkel signature over the message,
    /// so it is unpredictable without the secret key and checkable with the
    /// public key.
    pub fn fulfil(&self, input_message: String) -> Fulfilment {
        let transcript = SigningContext::new(VRF_SIGNING_CONTEXT).bytes(input_message.as_bytes());
        let signature = self.keypair.sign(transcript).to_bytes();

        Fulfilment {
            output: Sha256::digest(signature).to_vec(),
            proof: signature.to_vec(),
            public_key: self.keypair.public.to_bytes(),
            input_message,
        }
    }

    /// Check that a fulfilment was produced by the holder of `public_key`
    pub fn verify(fulfilment: &Fulfilment) -> bool {
        let Ok(public_key) = PublicKey::from_bytes(&fulfilment.public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_bytes(&fulfilment.proof) else {
            return false;
        };

        let transcript = SigningContext::new(VRF_SIGNING_CONTEXT).bytes(fulfilment.input_message.as_bytes());
        if public_key.verify(transcript, &signature).is_err() {
            return false;
        }

        // output must be derived from the proof
        Sha256::digest(&fulfilment.proof).as_slice() == fulfilment.output.as_slice()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}
